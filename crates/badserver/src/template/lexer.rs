use super::token::{Token, TokenType, lookup_ident};

/// Single-pass byte scanner over a template string.
pub struct Lexer {
	input: Vec<u8>,
	position: usize,
	read_position: usize,
	ch: u8,
}

impl Lexer {
	pub fn new(input: &str) -> Lexer {
		let mut lexer = Lexer {
			input: input.as_bytes().to_vec(),
			position: 0,
			read_position: 0,
			ch: 0,
		};
		lexer.read_char();
		lexer
	}

	/// Current byte offset, used to position parse errors.
	pub fn position(&self) -> usize {
		self.position
	}

	fn read_char(&mut self) {
		self.ch = self.input.get(self.read_position).copied().unwrap_or(0);
		self.position = self.read_position;
		self.read_position += 1;
	}

	pub fn next_token(&mut self) -> Token {
		let token = match self.ch {
			0 => Token::new(TokenType::Eof, ""),
			b'=' => Token::new(TokenType::Equal, "="),
			b';' => Token::new(TokenType::Semicolon, ";"),
			b'/' => Token::new(TokenType::Slash, "/"),
			b'[' => Token::new(TokenType::LeftBracket, "["),
			b']' => Token::new(TokenType::RightBracket, "]"),
			b':' => Token::new(TokenType::Colon, ":"),
			b',' => Token::new(TokenType::Comma, ","),
			b'|' => Token::new(TokenType::Pipe, "|"),
			ch if is_letter(ch) => {
				let ident = self.read_identifier();
				return Token::new(lookup_ident(&ident), ident);
			},
			ch if is_digit(ch) => {
				return Token::new(TokenType::Number, self.read_number());
			},
			ch => Token::new(TokenType::Illegal, (ch as char).to_string()),
		};
		self.read_char();
		token
	}

	fn read_identifier(&mut self) -> String {
		let start = self.position;
		// digits are allowed after the first character
		while is_letter(self.ch) || is_digit(self.ch) {
			self.read_char();
		}
		String::from_utf8_lossy(&self.input[start..self.position]).into_owned()
	}

	fn read_number(&mut self) -> String {
		let start = self.position;
		let mut seen_point = false;
		while is_digit(self.ch) || (self.ch == b'.' && !seen_point) {
			if self.ch == b'.' {
				seen_point = true;
			}
			self.read_char();
		}
		String::from_utf8_lossy(&self.input[start..self.position]).into_owned()
	}
}

fn is_letter(ch: u8) -> bool {
	ch.is_ascii_alphabetic() || ch == b'-' || ch == b'_'
}

fn is_digit(ch: u8) -> bool {
	ch.is_ascii_digit()
}
