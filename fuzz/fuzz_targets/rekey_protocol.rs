// SPDX-License-Identifier: MIT OR Apache-2.0
#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vault_rekey::{
    RekeyConfig, RekeyError, RekeyManager, RekeyStatus, RekeyUpdate, SealKeeper, UnsealVerifier,
};

#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Init { shares: u8, threshold: u8, backup: bool },
    /// Submit the current share at this index with the live nonce.
    Submit(u8),
    /// Submit the share with a corrupted nonce.
    SubmitStale(u8),
    SubmitRaw(Vec<u8>),
    Cancel,
    Status,
}

#[derive(Arbitrary, Debug)]
struct OpsInput {
    ops: Vec<FuzzOp>,
}

/// Shares that finish an attempt: `t`, raised to the unseal threshold and
/// capped at the number of current shares.
fn completion_target(status: &RekeyStatus, total: u8) -> u8 {
    status
        .t
        .max(status.required)
        .min(total.max(status.required))
}

fuzz_target!(|input: OpsInput| {
    if input.ops.len() > 64 {
        return;
    }

    let Ok((keeper, initial)) = SealKeeper::initialize(3, 2) else {
        return;
    };
    let keeper = Arc::new(keeper);
    let manager = RekeyManager::new(keeper.clone());
    let mut shares = initial;

    for op in input.ops {
        match op {
            FuzzOp::Init {
                shares: n,
                threshold: t,
                backup,
            } => {
                let n = n % 8;
                let t = t % 8;
                let result = manager.init(RekeyConfig::new(n, t).with_backup(backup));
                // Backups need recipient keys, which this target never supplies.
                let valid = n >= 1 && t >= 1 && t <= n && !backup;
                assert_eq!(result.is_ok(), valid, "init({n}, {t}) -> {result:?}");
            },
            FuzzOp::Submit(index) => {
                if shares.is_empty() {
                    continue;
                }
                let before = manager.status();
                let target = completion_target(&before, keeper.total());
                let share = shares[usize::from(index) % shares.len()].clone();
                match manager.update(&before.nonce, &share) {
                    Ok(RekeyUpdate::Progress(status)) => {
                        assert!(status.started);
                        assert_eq!(status.progress, before.progress + 1);
                        assert!(status.progress < target);
                    },
                    Ok(RekeyUpdate::Complete(result)) => {
                        assert_eq!(before.progress + 1, target);
                        assert_eq!(result.keys.len(), usize::from(before.n));
                        assert!(!manager.status().started);
                        assert_eq!(keeper.required(), before.t);
                        shares = result.keys;
                    },
                    Err(RekeyError::NotStarted) => assert!(!before.started),
                    Err(RekeyError::InvalidKey(_)) => {
                        assert_eq!(manager.status().progress, before.progress);
                    },
                    Err(e) => panic!("unexpected update error: {e}"),
                }
            },
            FuzzOp::SubmitStale(index) => {
                if shares.is_empty() {
                    continue;
                }
                let before = manager.status();
                let share = shares[usize::from(index) % shares.len()].clone();
                let stale = format!("{}x", before.nonce);
                assert!(manager.update(&stale, &share).is_err());
                assert_eq!(manager.status(), before);
            },
            FuzzOp::SubmitRaw(bytes) => {
                let before = manager.status();
                if manager.update(&before.nonce, &bytes).is_err() {
                    assert_eq!(manager.status(), before);
                }
            },
            FuzzOp::Cancel => {
                manager.cancel();
                assert!(!manager.status().started);
            },
            FuzzOp::Status => {
                let status = manager.status();
                assert!(
                    !status.started || status.progress < completion_target(&status, keeper.total())
                );
                assert_eq!(status.required, keeper.required());
            },
        }
    }
});
