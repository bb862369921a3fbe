//! A compact, header-friendly language for describing random JSON bodies.
//!
//! Examples:
//! `[string]:1000` is an array of 1000 random strings.
//! `[book]:1000;book=title/string,author/string` is an array of book objects.
//! `title/string,chapters/[string]:6` is rejected (objects need a name), but
//! `book;book=title/string,chapters/[string]:6` produces one book object.

mod ast;
mod lexer;
mod parser;
mod token;

pub use ast::{DataDecl, Primitive, Template};
pub use lexer::Lexer;
pub use parser::{ParseError, Parser};
pub use token::{Token, TokenType};

/// The value prefix that marks the fragment holding the template root.
pub const TEMPLATE_PREFIX: &str = "response_template=";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
	#[error("no fragment starts with {TEMPLATE_PREFIX}")]
	MissingPrefix,
	#[error("{0} fragments start with {TEMPLATE_PREFIX}, expected exactly one")]
	MultiplePrefixes(usize),
}

/// Combine the header values carrying a template into one program string.
/// Exactly one fragment must carry the `response_template=` prefix; it is
/// moved to the front and stripped, and all fragments are joined with `;`.
pub fn normalize_template_params(fragments: &[&str]) -> Result<String, NormalizeError> {
	let (prefixed, rest): (Vec<&str>, Vec<&str>) = fragments
		.iter()
		.partition(|fragment| fragment.starts_with(TEMPLATE_PREFIX));

	let root = match prefixed.as_slice() {
		[] => return Err(NormalizeError::MissingPrefix),
		[root] => &root[TEMPLATE_PREFIX.len()..],
		many => return Err(NormalizeError::MultiplePrefixes(many.len())),
	};

	let mut combined = root.to_string();
	for fragment in rest {
		combined.push(';');
		combined.push_str(fragment);
	}
	Ok(combined)
}
