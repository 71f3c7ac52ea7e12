pub mod ast;
pub mod lexer;
pub mod parser;

pub use lexer::tokenize;
pub use parser::parse;
