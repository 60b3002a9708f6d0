#![no_main]

use greenlight::config::loader::expand_env_vars;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|raw: &str| {
    if let Ok(expanded) = expand_env_vars(raw) {
        // Text without any `$` passes through untouched.
        if !raw.contains('$') {
            assert_eq!(expanded, raw);
        }
    }
});
