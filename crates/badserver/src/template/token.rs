use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
	Illegal,
	Eof,
	Slash,
	LeftBracket,
	RightBracket,
	Equal,
	Colon,
	Comma,
	Semicolon,
	Pipe,

	// data types
	StringType,
	IntType,
	IncrementType,
	BoolType,
	FloatType,

	// keys, sizes, or enum members
	KeyName,
	Number,
}

impl TokenType {
	pub fn is_data_type(self) -> bool {
		matches!(
			self,
			TokenType::StringType
				| TokenType::IntType
				| TokenType::IncrementType
				| TokenType::BoolType
				| TokenType::FloatType
		)
	}
}

impl fmt::Display for TokenType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			TokenType::Illegal => "ILLEGAL",
			TokenType::Eof => "EOF",
			TokenType::Slash => "/",
			TokenType::LeftBracket => "[",
			TokenType::RightBracket => "]",
			TokenType::Equal => "=",
			TokenType::Colon => ":",
			TokenType::Comma => ",",
			TokenType::Semicolon => ";",
			TokenType::Pipe => "|",
			TokenType::StringType => "string",
			TokenType::IntType => "int",
			TokenType::IncrementType => "increment",
			TokenType::BoolType => "bool",
			TokenType::FloatType => "float",
			TokenType::KeyName => "KEY_NAME",
			TokenType::Number => "NUMBER",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
	pub kind: TokenType,
	pub literal: String,
}

impl Token {
	pub fn new(kind: TokenType, literal: impl Into<String>) -> Token {
		Token {
			kind,
			literal: literal.into(),
		}
	}
}

/// Decide whether an identifier is a known data type or a key name.
pub fn lookup_ident(ident: &str) -> TokenType {
	match ident {
		"string" => TokenType::StringType,
		"int" => TokenType::IntType,
		"increment" => TokenType::IncrementType,
		"bool" => TokenType::BoolType,
		"float" => TokenType::FloatType,
		_ => TokenType::KeyName,
	}
}
