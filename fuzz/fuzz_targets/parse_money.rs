#![no_main]

use libfuzzer_sys::fuzz_target;
use tote_core::{CurrencyCode, Money};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(usd) = CurrencyCode::new("USD") else {
        return;
    };

    if let Ok(money) = Money::parse(text, usd.clone()) {
        // Whatever parses must re-parse to the same amount.
        let again = Money::parse(&money.amount(), usd).expect("formatted amount parses");
        assert_eq!(again.minor(), money.minor());
    }
});
