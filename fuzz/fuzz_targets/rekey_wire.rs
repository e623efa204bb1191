// SPDX-License-Identifier: MIT OR Apache-2.0
#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use vault_rekey::{RekeyHandler, RekeyManager, RekeyStatus, SealKeeper};

fuzz_target!(|data: &[u8]| {
    let Ok((keeper, _)) = SealKeeper::initialize(3, 2) else {
        return;
    };
    let handler = RekeyHandler::new(RekeyManager::new(Arc::new(keeper)));

    let resp = handler.initialize(data);
    assert!(resp.status == 200 || resp.status == 400, "init -> {}", resp.status);

    let before: Option<RekeyStatus> = handler.read_status().parse();
    let resp = handler.submit(data);
    assert!(resp.status == 200 || resp.status == 400, "submit -> {}", resp.status);
    if resp.status == 400 {
        let after: Option<RekeyStatus> = handler.read_status().parse();
        assert_eq!(before, after);
    }
});
