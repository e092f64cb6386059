#![no_main]

use jsweave::lexer::{Lexer, TokenKind};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    if source.len() > 100_000 {
        return;
    }

    // Every input ends in Eof; errors surface as tokens, never panics
    let mut lexer = Lexer::new(source);
    while lexer.next_token().kind != TokenKind::Eof {}
});
