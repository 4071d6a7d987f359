#![no_main]

use libfuzzer_sys::fuzz_target;
use rebind_core::{PathError, Record, Schema, Value, resolve, schema};

#[derive(Debug, Clone, PartialEq)]
struct Inner {
    label: String,
    count: u32,
}

impl Record for Inner {
    fn schema() -> Schema<Self> {
        schema!(Inner { label, count })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Outer {
    inner: Inner,
    flag: bool,
}

impl Record for Outer {
    fn schema() -> Schema<Self> {
        schema!(Outer {
            record inner,
            flag,
            computed summary = |o: &Outer| format!("{}:{}", o.inner.label, o.inner.count),
        })
    }
}

fuzz_target!(|data: &[u8]| {
    let Ok(expr) = std::str::from_utf8(data) else {
        return;
    };
    if expr.len() > 1024 {
        return;
    }

    // Resolution must never panic, only succeed or report a PathError.
    match resolve::<Outer>(expr) {
        Ok(chain) => {
            // A resolved chain renders back to the trimmed, dotted path.
            let rendered = chain.to_string();
            let normalized: Vec<&str> = expr.trim().split('.').map(str::trim).collect();
            assert_eq!(rendered, normalized.join("."));

            // Every resolved chain can read the model.
            let model = Value::new(Outer {
                inner: Inner {
                    label: "x".into(),
                    count: 1,
                },
                flag: true,
            });
            assert!(chain.get(&model).is_ok());
        }
        Err(PathError::Empty) => assert!(expr.trim().is_empty()),
        Err(_) => {}
    }
});
