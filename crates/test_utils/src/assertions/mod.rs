// Path: crates/test_utils/src/assertions/mod.rs
//! Assertion utilities for testing

/// Assert that a result is OK and unwrap it
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(err) => panic!("Expected Ok, got Err: {:?}", err),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match $expr {
            Ok(val) => val,
            Err(err) => panic!("Expected Ok, got Err: {:?} ({})", err, format!($($arg)+)),
        }
    };
}

/// Assert that a result is Err and unwrap the error
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(val) => panic!("Expected Err, got Ok: {:?}", val),
            Err(err) => err,
        }
    };
}

/// Assert that an event carries `key` with the given value
#[macro_export]
macro_rules! assert_attribute {
    ($event:expr, $key:expr, $value:expr) => {
        assert_eq!(
            $event.attribute($key),
            Some($value),
            "attribute `{}` of `{}` event",
            $key,
            $event.kind
        );
    };
}
