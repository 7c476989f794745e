//! SQL tokenizer.
//!
//! Yields one lexical token at a time over raw statement bytes, respecting
//! quoting, dollar-quoting, escapes and the connection's multibyte encoding.

mod span;
mod token;
mod tokenizer;

pub use span::Span;
pub use token::{Delimiter, Quote, Token};
pub use tokenizer::{DEFAULT_MAX_TOKEN_LEN, Lexer};
