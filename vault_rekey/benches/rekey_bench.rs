// SPDX-License-Identifier: MIT OR Apache-2.0
//! Benchmarks for rekey operations.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vault_rekey::{
    shamir, RecipientKey, RekeyConfig, RekeyManager, SealKeeper, SealedBoxEncryptor,
    ShareEncryptor, UnsealVerifier,
};

fn bench_shamir_split(c: &mut Criterion) {
    let secret = [0x42u8; 32];
    let mut group = c.benchmark_group("shamir_split");
    for (n, t) in [(3u8, 2u8), (5, 3), (10, 6)] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{t}of{n}")), &(n, t), |b, &(n, t)| {
            b.iter(|| shamir::split(black_box(&secret), n, t).unwrap());
        });
    }
    group.finish();
}

fn bench_shamir_combine(c: &mut Criterion) {
    let shares = shamir::split(&[0x42u8; 32], 5, 3).unwrap();
    c.bench_function("shamir_combine_3of5", |b| {
        b.iter(|| shamir::combine(black_box(&shares[..3])).unwrap());
    });
}

fn bench_verify_share(c: &mut Criterion) {
    let (keeper, shares) = SealKeeper::initialize(5, 3).unwrap();
    c.bench_function("verify_share", |b| {
        b.iter(|| keeper.verify_share(black_box(&shares[0])));
    });
}

fn bench_seal_share(c: &mut Criterion) {
    let recipient = RecipientKey::generate().public_key();
    let share = [7u8; 33];
    c.bench_function("seal_share_for_recipient", |b| {
        b.iter(|| SealedBoxEncryptor.encrypt(black_box(&recipient), black_box(&share)).unwrap());
    });
}

fn bench_full_rekey(c: &mut Criterion) {
    c.bench_function("rekey_5of3_full_cycle", |b| {
        let (keeper, mut shares) = SealKeeper::initialize(5, 3).unwrap();
        let keeper = Arc::new(keeper);
        let manager = RekeyManager::new(keeper);
        b.iter(|| {
            let nonce = manager.init(RekeyConfig::new(5, 3)).unwrap().nonce;
            let mut outcome = None;
            for share in &shares[..3] {
                outcome = Some(manager.update(&nonce, share).unwrap());
            }
            if let Some(vault_rekey::RekeyUpdate::Complete(result)) = outcome {
                shares = result.keys;
            }
        });
    });
}

criterion_group!(
    benches,
    bench_shamir_split,
    bench_shamir_combine,
    bench_verify_share,
    bench_seal_share,
    bench_full_rekey,
);
criterion_main!(benches);
