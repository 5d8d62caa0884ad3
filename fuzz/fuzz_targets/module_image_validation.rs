#![no_main]
use libfuzzer_sys::fuzz_target;
use script_sandbox::module::metadata::ScriptImage;
use script_sandbox::module::security::PolicySet;
use script_sandbox::module::validation;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    // Untrusted image bytes: decoding may fail, validation must always produce a verdict

    let image = match ScriptImage::decode(data) {
        Ok(image) => image,
        Err(_) => return,
    };

    let policy = Arc::new(PolicySet::with_defaults());
    let _verdict = validation::validate_module(&policy, &image);

    // Empty policy sees the same structure, only malformed bodies can reject
    let open = Arc::new(PolicySet::new());
    let verdict = validation::validate_module(&open, &image);
    if let Some(kind) = verdict.kind() {
        assert_eq!(kind, validation::DenialKind::Malformed);
    }
});
