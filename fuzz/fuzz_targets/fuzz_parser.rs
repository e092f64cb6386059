#![no_main]

use jsweave::parser::Parser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    if source.len() > 100_000 {
        return;
    }

    let _ = Parser::new(source).parse_program();
    let _ = Parser::new(source).parse_module();
});
