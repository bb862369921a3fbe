//! Streaming generators for random JSON bodies. A generator tree mirrors a
//! parsed template declaration and writes its output directly to a sink,
//! so arbitrarily large bodies never materialize in memory.

use std::io;
use std::io::Write;

use rand::Rng;

use crate::template::{self, DataDecl, Primitive, Template};

const STRING_CHARACTERS: &[u8; 52] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RANDOM_STRING_LENGTH: usize = 30;
const MAX_RANDOM_INT: i64 = 10000;

// named references may chain through other named objects; resolution deeper
// than this is treated as a cycle
const MAX_REFERENCE_DEPTH: usize = 64;

/// A sink that tallies the bytes the underlying writer actually accepted,
/// tolerating short writes. After an error the count equals the prefix the
/// writer observed.
pub struct CountingWriter<'a> {
	inner: &'a mut dyn Write,
	written: usize,
}

impl<'a> CountingWriter<'a> {
	pub fn new(inner: &'a mut dyn Write) -> CountingWriter<'a> {
		CountingWriter {
			inner,
			written: 0,
		}
	}

	pub fn written(&self) -> usize {
		self.written
	}

	fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
		while !buf.is_empty() {
			match self.inner.write(buf) {
				Ok(0) => {
					return Err(io::Error::new(
						io::ErrorKind::WriteZero,
						"sink accepted no bytes",
					));
				},
				Ok(accepted) => {
					self.written += accepted;
					buf = &buf[accepted..];
				},
				Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
				Err(err) => return Err(err),
			}
		}
		Ok(())
	}
}

/// One node of a generator tree. Writes its JSON representation to the sink;
/// on error the sink's count still matches what the sink accepted.
pub trait Generate: Send + std::fmt::Debug {
	fn generate(&mut self, out: &mut CountingWriter<'_>) -> io::Result<()>;
}

pub type BoxGenerator = Box<dyn Generate>;

/// Parse a template program and build the generator tree for its root.
pub fn template_generator(input: &str) -> Result<BoxGenerator, BuildError> {
	let template = template::Parser::new(input).parse_template()?;
	let root = template.root().ok_or(BuildError::EmptyTemplate)?;
	generator_for(&template, root, 0)
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
	#[error("template does not parse: {0}")]
	Parse(#[from] template::ParseError),
	#[error("no json template definitions found")]
	EmptyTemplate,
	#[error("unknown data type: {0}")]
	UnknownType(String),
	#[error("reference {0} nests deeper than {MAX_REFERENCE_DEPTH} levels")]
	ReferenceCycle(String),
}

fn generator_for(
	template: &Template,
	declaration: &DataDecl,
	depth: usize,
) -> Result<BoxGenerator, BuildError> {
	match declaration {
		DataDecl::Primitive(primitive) => Ok(primitive_generator(*primitive)),
		DataDecl::EnumString(values) => Ok(Box::new(StringFromSet {
			values: values.clone(),
		})),
		DataDecl::EnumInt(values) => Ok(Box::new(IntFromSet {
			values: values.clone(),
		})),
		DataDecl::EnumFloat(values) => Ok(Box::new(FloatFromSet {
			values: values.clone(),
		})),
		DataDecl::Array { element, length } => Ok(Box::new(ArrayGenerator {
			length: *length,
			element: generator_for(template, element, depth)?,
		})),
		DataDecl::KeyValue { key, value } => Ok(Box::new(KeyValueGenerator {
			key: FixedString(key.clone()),
			value: generator_for(template, value, depth)?,
		})),
		DataDecl::Object(members) => {
			let mut generators = Vec::with_capacity(members.len());
			for member in members {
				generators.push(generator_for(template, member, depth)?);
			}
			Ok(Box::new(ObjectGenerator {
				members: generators,
			}))
		},
		DataDecl::KeyName(name) => {
			if depth >= MAX_REFERENCE_DEPTH {
				return Err(BuildError::ReferenceCycle(name.clone()));
			}
			let object = template
				.custom_types
				.get(name)
				.ok_or_else(|| BuildError::UnknownType(name.clone()))?;
			generator_for(template, object, depth + 1)
		},
	}
}

fn primitive_generator(primitive: Primitive) -> BoxGenerator {
	match primitive {
		Primitive::String => Box::new(RandomString {
			length: RANDOM_STRING_LENGTH,
		}),
		Primitive::Int => Box::new(RandomInt {
			max: MAX_RANDOM_INT,
		}),
		Primitive::Bool => Box::new(RandomBool),
		Primitive::Increment => Box::new(Increment { current: 1 }),
		Primitive::Float => Box::new(RandomFloat { max: 1.0 }),
	}
}

/// An object carrying a single error message, used when a template cannot
/// be turned into a body.
pub fn error_generator(message: &str) -> BoxGenerator {
	let escaped = message.replace('\\', "\\\\").replace('"', "\\\"");
	Box::new(ObjectGenerator {
		members: vec![Box::new(KeyValueGenerator {
			key: FixedString("error".to_string()),
			value: Box::new(FixedString(escaped)),
		})],
	})
}

#[derive(Debug)]
struct RandomString {
	length: usize,
}

impl Generate for RandomString {
	fn generate(&mut self, out: &mut CountingWriter<'_>) -> io::Result<()> {
		let mut rng = rand::rng();
		let mut buffer = Vec::with_capacity(self.length + 2);
		buffer.push(b'"');
		for _ in 0..self.length {
			buffer.push(STRING_CHARACTERS[rng.random_range(0..STRING_CHARACTERS.len())]);
		}
		buffer.push(b'"');
		out.write_all(&buffer)
	}
}

#[derive(Debug)]
struct FixedString(String);

impl Generate for FixedString {
	fn generate(&mut self, out: &mut CountingWriter<'_>) -> io::Result<()> {
		out.write_all(b"\"")?;
		out.write_all(self.0.as_bytes())?;
		out.write_all(b"\"")
	}
}

#[derive(Debug)]
struct RandomBool;

impl Generate for RandomBool {
	fn generate(&mut self, out: &mut CountingWriter<'_>) -> io::Result<()> {
		let literal: &[u8] = if rand::rng().random_bool(0.5) {
			b"true"
		} else {
			b"false"
		};
		out.write_all(literal)
	}
}

#[derive(Debug)]
struct RandomInt {
	max: i64,
}

impl Generate for RandomInt {
	fn generate(&mut self, out: &mut CountingWriter<'_>) -> io::Result<()> {
		let value = rand::rng().random_range(0..self.max);
		out.write_all(value.to_string().as_bytes())
	}
}

#[derive(Debug)]
struct RandomFloat {
	max: f64,
}

impl Generate for RandomFloat {
	fn generate(&mut self, out: &mut CountingWriter<'_>) -> io::Result<()> {
		let value = rand::rng().random::<f64>() * self.max;
		out.write_all(format!("{value:.6}").as_bytes())
	}
}

/// Counts up from its starting value, advancing even when the write fails:
/// a retried element is expected to continue the sequence, not repeat it.
#[derive(Debug)]
struct Increment {
	current: i64,
}

impl Generate for Increment {
	fn generate(&mut self, out: &mut CountingWriter<'_>) -> io::Result<()> {
		let result = out.write_all(self.current.to_string().as_bytes());
		self.current += 1;
		result
	}
}

#[derive(Debug)]
struct StringFromSet {
	values: Vec<String>,
}

impl Generate for StringFromSet {
	fn generate(&mut self, out: &mut CountingWriter<'_>) -> io::Result<()> {
		let index = rand::rng().random_range(0..self.values.len());
		FixedString(self.values[index].clone()).generate(out)
	}
}

#[derive(Debug)]
struct IntFromSet {
	values: Vec<i64>,
}

impl Generate for IntFromSet {
	fn generate(&mut self, out: &mut CountingWriter<'_>) -> io::Result<()> {
		let index = rand::rng().random_range(0..self.values.len());
		out.write_all(self.values[index].to_string().as_bytes())
	}
}

#[derive(Debug)]
struct FloatFromSet {
	values: Vec<f64>,
}

impl Generate for FloatFromSet {
	fn generate(&mut self, out: &mut CountingWriter<'_>) -> io::Result<()> {
		let index = rand::rng().random_range(0..self.values.len());
		out.write_all(self.values[index].to_string().as_bytes())
	}
}

/// Repeats one element generator, so per-element state such as `increment`
/// advances across the array.
#[derive(Debug)]
struct ArrayGenerator {
	length: usize,
	element: BoxGenerator,
}

impl Generate for ArrayGenerator {
	fn generate(&mut self, out: &mut CountingWriter<'_>) -> io::Result<()> {
		out.write_all(b"[")?;
		for index in 0..self.length {
			if index > 0 {
				out.write_all(b",")?;
			}
			self.element.generate(out)?;
		}
		out.write_all(b"]")
	}
}

#[derive(Debug)]
struct KeyValueGenerator {
	key: FixedString,
	value: BoxGenerator,
}

impl Generate for KeyValueGenerator {
	fn generate(&mut self, out: &mut CountingWriter<'_>) -> io::Result<()> {
		self.key.generate(out)?;
		out.write_all(b":")?;
		self.value.generate(out)
	}
}

#[derive(Debug)]
struct ObjectGenerator {
	members: Vec<BoxGenerator>,
}

impl Generate for ObjectGenerator {
	fn generate(&mut self, out: &mut CountingWriter<'_>) -> io::Result<()> {
		out.write_all(b"{")?;
		for (index, member) in self.members.iter_mut().enumerate() {
			if index > 0 {
				out.write_all(b",")?;
			}
			member.generate(out)?;
		}
		out.write_all(b"}")
	}
}
