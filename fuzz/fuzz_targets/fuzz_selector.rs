#![no_main]

use libfuzzer_sys::fuzz_target;
use rebind_core::{Record, Schema, resolve_selector, schema};

#[derive(Debug, Clone, PartialEq)]
struct Item {
    id: u32,
    name: String,
}

impl Record for Item {
    fn schema() -> Schema<Self> {
        schema!(Item { id, name })
    }
}

fuzz_target!(|data: &[u8]| {
    let Ok(expr) = std::str::from_utf8(data) else {
        return;
    };
    if expr.len() > 1024 {
        return;
    }

    // Selector parsing must never panic.
    if let Ok(selector) = resolve_selector::<Item, u32, String>(expr) {
        let item = Item {
            id: 7,
            name: "seven".into(),
        };
        assert_eq!(selector.project(&item).ok(), Some((7, "seven".to_string())));
    }
});
