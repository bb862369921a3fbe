use std::collections::HashMap;

/// The primitive value kinds the language can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
	String,
	Int,
	Bool,
	Increment,
	Float,
}

impl Primitive {
	pub fn name(self) -> &'static str {
		match self {
			Primitive::String => "string",
			Primitive::Int => "int",
			Primitive::Bool => "bool",
			Primitive::Increment => "increment",
			Primitive::Float => "float",
		}
	}
}

/// One data declaration. A template is a series of these; the first is the
/// root of the generated JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum DataDecl {
	Primitive(Primitive),
	EnumString(Vec<String>),
	EnumInt(Vec<i64>),
	EnumFloat(Vec<f64>),
	Array {
		element: Box<DataDecl>,
		length: usize,
	},
	KeyValue {
		key: String,
		value: Box<DataDecl>,
	},
	Object(Vec<DataDecl>),
	/// A reference to a named object, resolved when generators are built.
	KeyName(String),
}

pub const DEFAULT_ARRAY_LENGTH: usize = 10000;

impl DataDecl {
	/// A printable rendering of the declaration. Primitive, array, and
	/// key-name renderings parse back to the same declaration.
	pub fn token_literal(&self) -> String {
		match self {
			DataDecl::Primitive(primitive) => primitive.name().to_string(),
			DataDecl::KeyName(name) => name.clone(),
			DataDecl::EnumString(values) => format!("({})", values.join("|")),
			DataDecl::EnumInt(values) => {
				let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
				format!("({})", rendered.join("|"))
			},
			DataDecl::EnumFloat(values) => {
				let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
				format!("({})", rendered.join("|"))
			},
			DataDecl::Array { element, length } => {
				format!("[{}]:{}", element.token_literal(), length)
			},
			DataDecl::KeyValue { key, value } => format!("{}: {}", key, value.token_literal()),
			DataDecl::Object(members) => {
				let rendered: Vec<String> = members.iter().map(|m| m.token_literal()).collect();
				format!("{{{}}}", rendered.join(", "))
			},
		}
	}
}

/// A parsed template: the ordered top-level declarations plus the named
/// objects they may reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
	pub declarations: Vec<DataDecl>,
	pub custom_types: HashMap<String, DataDecl>,
}

impl Template {
	pub fn root(&self) -> Option<&DataDecl> {
		self.declarations.first()
	}

	pub(crate) fn add_declaration(&mut self, declaration: DataDecl) {
		self.declarations.push(declaration);
	}

	pub(crate) fn add_custom_type(&mut self, name: String, declaration: DataDecl) {
		self.custom_types.insert(name, declaration);
	}
}
