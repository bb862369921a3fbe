use super::ast::{DEFAULT_ARRAY_LENGTH, DataDecl, Primitive, Template};
use super::lexer::Lexer;
use super::token::{Token, TokenType};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseError {
	#[error("unexpected token {found:?} at position {position}")]
	UnexpectedToken { found: String, position: usize },
	#[error("expected {expected} at position {position}, got {found}")]
	ExpectedToken {
		expected: String,
		found: TokenType,
		position: usize,
	},
	#[error("array length {literal:?} at position {position} is not an integer")]
	ArrayLength { literal: String, position: usize },
	#[error("{kind} values cannot be enumerated, at position {position}")]
	NotEnumerable {
		kind: &'static str,
		position: usize,
	},
	#[error("enum value {literal:?} at position {position} is not an integer")]
	IntEnumValue { literal: String, position: usize },
	#[error("enum value {literal:?} at position {position} is not a number")]
	FloatEnumValue { literal: String, position: usize },
	#[error("enum at position {position} has no values")]
	EmptyEnum { position: usize },
}

/// Recursive-descent parser over the template token stream.
pub struct Parser {
	lexer: Lexer,
	cur: Token,
	peek: Token,
}

impl Parser {
	pub fn new(input: &str) -> Parser {
		let mut lexer = Lexer::new(input);
		let cur = lexer.next_token();
		let peek = lexer.next_token();
		Parser { lexer, cur, peek }
	}

	fn advance(&mut self) {
		self.cur = std::mem::replace(&mut self.peek, self.lexer.next_token());
	}

	fn position(&self) -> usize {
		self.lexer.position()
	}

	pub fn parse_template(&mut self) -> Result<Template, ParseError> {
		let mut template = Template::default();

		while self.cur.kind != TokenType::Eof {
			if self.cur.kind == TokenType::Semicolon {
				self.advance();
				continue;
			}

			if self.cur.kind == TokenType::KeyName && self.peek.kind == TokenType::Equal {
				// a named object definition
				let name = self.cur.literal.clone();
				self.advance();
				let object = self.parse_object()?;
				template.add_custom_type(name, object.clone());
				template.add_declaration(object);
			} else {
				let declaration = self.parse_value()?;
				template.add_declaration(declaration);
			}

			self.expect_peek_one_of(&[TokenType::Semicolon, TokenType::Eof])?;
			self.advance();
		}
		Ok(template)
	}

	/// Parse a value form with the current token at its first token:
	/// a primitive, an enum, an array, or a reference to a named object.
	fn parse_value(&mut self) -> Result<DataDecl, ParseError> {
		match self.cur.kind {
			TokenType::LeftBracket => self.parse_array(),
			TokenType::KeyName => Ok(DataDecl::KeyName(self.cur.literal.clone())),
			kind if kind.is_data_type() => {
				if self.peek.kind == TokenType::Pipe {
					self.parse_enum()
				} else {
					Ok(DataDecl::Primitive(primitive_for(kind)))
				}
			},
			_ => Err(ParseError::UnexpectedToken {
				found: self.cur.literal.clone(),
				position: self.position(),
			}),
		}
	}

	/// The current token is `[`.
	fn parse_array(&mut self) -> Result<DataDecl, ParseError> {
		self.expect_peek_one_of(&[
			TokenType::LeftBracket,
			TokenType::KeyName,
			TokenType::StringType,
			TokenType::IntType,
			TokenType::BoolType,
			TokenType::IncrementType,
			TokenType::FloatType,
		])?;
		self.advance();

		let element = self.parse_value()?;

		self.expect_peek(TokenType::RightBracket)?;
		self.advance();

		let mut length = DEFAULT_ARRAY_LENGTH;
		if self.peek.kind == TokenType::Colon {
			self.advance();
			self.expect_peek(TokenType::Number)?;
			self.advance();
			length = self
				.cur
				.literal
				.parse()
				.map_err(|_| ParseError::ArrayLength {
					literal: self.cur.literal.clone(),
					position: self.position(),
				})?;
		}

		Ok(DataDecl::Array {
			element: Box::new(element),
			length,
		})
	}

	/// The current token is a primitive data type and the next is `|`.
	fn parse_enum(&mut self) -> Result<DataDecl, ParseError> {
		let position = self.position();
		let primitive = primitive_for(self.cur.kind);
		match primitive {
			Primitive::String | Primitive::Int | Primitive::Float => {},
			Primitive::Bool | Primitive::Increment => {
				return Err(ParseError::NotEnumerable {
					kind: primitive.name(),
					position,
				});
			},
		}

		self.advance();
		let values = self.extract_enum_values()?;
		if values.is_empty() {
			return Err(ParseError::EmptyEnum { position });
		}

		match primitive {
			Primitive::String => Ok(DataDecl::EnumString(values)),
			Primitive::Int => values
				.into_iter()
				.map(|literal| {
					literal
						.parse::<i64>()
						.map_err(|_| ParseError::IntEnumValue {
							literal,
							position,
						})
				})
				.collect::<Result<Vec<_>, _>>()
				.map(DataDecl::EnumInt),
			Primitive::Float => values
				.into_iter()
				.map(|literal| {
					literal
						.parse::<f64>()
						.map_err(|_| ParseError::FloatEnumValue {
							literal,
							position,
						})
				})
				.collect::<Result<Vec<_>, _>>()
				.map(DataDecl::EnumFloat),
			_ => unreachable!("checked above"),
		}
	}

	/// The current token is `|`. Collect comma-separated literals until a
	/// semicolon, a closing bracket, or the end of input.
	fn extract_enum_values(&mut self) -> Result<Vec<String>, ParseError> {
		let mut values = Vec::new();
		loop {
			if matches!(
				self.peek.kind,
				TokenType::Semicolon | TokenType::Eof | TokenType::RightBracket
			) {
				return Ok(values);
			}
			self.advance();

			match self.cur.kind {
				TokenType::KeyName | TokenType::Number => values.push(self.cur.literal.clone()),
				kind if kind.is_data_type() => values.push(self.cur.literal.clone()),
				_ => {
					return Err(ParseError::UnexpectedToken {
						found: self.cur.literal.clone(),
						position: self.position(),
					});
				},
			}

			match self.peek.kind {
				TokenType::Comma => self.advance(),
				TokenType::Semicolon | TokenType::Eof | TokenType::RightBracket => return Ok(values),
				_ => {
					return Err(self.expected_error("one of `,` `;` `]`"));
				},
			}
		}
	}

	/// The current token is `=`; the member list follows.
	fn parse_object(&mut self) -> Result<DataDecl, ParseError> {
		self.expect_peek(TokenType::KeyName)?;
		self.advance();

		let mut members = Vec::new();
		loop {
			// each iteration starts with the current token at a member key
			let key = self.cur.literal.clone();

			self.expect_peek(TokenType::Slash)?;
			self.advance();

			self.expect_peek_one_of(&[
				TokenType::LeftBracket,
				TokenType::KeyName,
				TokenType::StringType,
				TokenType::IntType,
				TokenType::BoolType,
				TokenType::IncrementType,
				TokenType::FloatType,
			])?;
			self.advance();

			let value = self.parse_value()?;
			members.push(DataDecl::KeyValue {
				key,
				value: Box::new(value),
			});

			match self.peek.kind {
				TokenType::Semicolon | TokenType::Eof => return Ok(DataDecl::Object(members)),
				TokenType::Comma => {
					self.advance();
					self.expect_peek(TokenType::KeyName)?;
					self.advance();
				},
				_ => return Err(self.expected_error("one of `,` `;` or end of input")),
			}
		}
	}

	fn expect_peek(&self, kind: TokenType) -> Result<(), ParseError> {
		if self.peek.kind != kind {
			return Err(self.expected_error(&kind.to_string()));
		}
		Ok(())
	}

	fn expect_peek_one_of(&self, kinds: &[TokenType]) -> Result<(), ParseError> {
		if kinds.contains(&self.peek.kind) {
			return Ok(());
		}
		let expected = kinds
			.iter()
			.map(|kind| kind.to_string())
			.collect::<Vec<_>>()
			.join(" ");
		Err(self.expected_error(&format!("one of {expected}")))
	}

	fn expected_error(&self, expected: &str) -> ParseError {
		ParseError::ExpectedToken {
			expected: expected.to_string(),
			found: self.peek.kind,
			position: self.position(),
		}
	}
}

fn primitive_for(kind: TokenType) -> Primitive {
	match kind {
		TokenType::StringType => Primitive::String,
		TokenType::IntType => Primitive::Int,
		TokenType::BoolType => Primitive::Bool,
		TokenType::IncrementType => Primitive::Increment,
		TokenType::FloatType => Primitive::Float,
		_ => unreachable!("{kind} is not a data type"),
	}
}

#[cfg(test)]
mod tests {
	use test_case::test_case;

	use super::*;

	fn parse(input: &str) -> Result<Template, ParseError> {
		Parser::new(input).parse_template()
	}

	#[test]
	fn plain_data_types() {
		let template = parse("string;int;bool;increment;float").unwrap();
		assert_eq!(template.declarations.len(), 5);
	}

	#[test_case("string", "string")]
	#[test_case("int", "int")]
	#[test_case("bool", "bool")]
	#[test_case("increment", "increment")]
	#[test_case("float", "float")]
	#[test_case("[string]", "[string]:10000")]
	#[test_case("[string]:100", "[string]:100")]
	#[test_case("[float]:3", "[float]:3")]
	#[test_case("book=title/string", "{title: string}")]
	#[test_case("book=title/string,pages/[string]", "{title: string, pages: [string]:10000}")]
	#[test_case("[string|a,b,c]", "[(a|b|c)]:10000")]
	#[test_case("int|1,2,3", "(1|2|3)")]
	#[test_case("float|1.5,2.25", "(1.5|2.25)")]
	fn token_literals(input: &str, expected: &str) {
		let template = parse(input).unwrap();
		let root = template.root().expect("template is not empty");
		assert_eq!(root.token_literal(), expected);
	}

	#[test_case("book;book=title/string", &["book", "{title: string}"]; "two_statements")]
	#[test_case("book;book=pages/[page]:1;page=text/string", &["book", "{pages: [page]:1}", "{text: string}"]; "three_statements")]
	#[test_case("book;book=pages/[page]:1;;page=text/string", &["book", "{pages: [page]:1}", "{text: string}"]; "three_statements_with_blank")]
	fn multiple_statements(input: &str, expected: &[&str]) {
		let template = parse(input).unwrap();
		let literals: Vec<String> = template
			.declarations
			.iter()
			.map(|d| d.token_literal())
			.collect();
		assert_eq!(literals, expected);
	}

	#[test]
	fn named_objects_are_registered() {
		let template = parse("book;book=title/string").unwrap();
		assert_eq!(
			template.custom_types.get("book"),
			Some(&DataDecl::Object(vec![DataDecl::KeyValue {
				key: "title".to_string(),
				value: Box::new(DataDecl::Primitive(Primitive::String)),
			}]))
		);
	}

	#[test_case("string&"; "trailing_ampersand")]
	#[test_case("[123]"; "array_of_number_literal")]
	#[test_case("[string]:gh"; "non_numeric_array_length")]
	#[test_case("[string]:1.5"; "fractional_array_length")]
	#[test_case("[123"; "unclosed_array")]
	#[test_case("book=string"; "object_without_key_name")]
	#[test_case("book=title"; "object_without_type")]
	#[test_case("book=title/string/isbn/string"; "object_with_extra_slash")]
	#[test_case("book=pages/[page]:100;%;page=text/string"; "stray_percent_statement")]
	#[test_case("int|1,a,3"; "int_enum_with_non_numeric_value")]
	#[test_case("int|1.5"; "int_enum_with_fractional_value")]
	#[test_case("int|"; "int_enum_empty")]
	#[test_case("float|1,x"; "float_enum_with_non_numeric_value")]
	#[test_case("bool|true,false"; "bool_enum_not_allowed")]
	#[test_case("increment|1,2"; "increment_enum_not_allowed")]
	fn parse_errors(input: &str) {
		assert!(parse(input).is_err(), "{input:?} should not parse");
	}

	#[test]
	fn errors_carry_a_position() {
		let err = parse("book=string").unwrap_err();
		match err {
			ParseError::ExpectedToken { position, .. } => assert!(position > 0),
			other => panic!("unexpected error {other:?}"),
		}
	}

	#[test]
	fn enum_values_are_extracted() {
		let template = parse("string|1,a,c").unwrap();
		assert_eq!(
			template.root(),
			Some(&DataDecl::EnumString(vec![
				"1".to_string(),
				"a".to_string(),
				"c".to_string()
			]))
		);
	}

	#[test]
	fn nested_arrays_are_allowed() {
		let template = parse("[[int]:2]:3").unwrap();
		assert_eq!(
			template.root().unwrap().token_literal(),
			"[[int]:2]:3"
		);
	}

	// primitive, array, and key-name renderings are themselves valid input
	#[test_case("string"; "round_trip_string")]
	#[test_case("increment"; "round_trip_increment")]
	#[test_case("[string]"; "round_trip_array")]
	#[test_case("[book]:5"; "round_trip_named_array")]
	#[test_case("bookshelf"; "round_trip_key_name")]
	fn literals_round_trip(input: &str) {
		let first = parse(input).unwrap();
		let rendered = first.root().unwrap().token_literal();
		let second = parse(&rendered).unwrap();
		assert_eq!(first.root(), second.root());
	}
}
