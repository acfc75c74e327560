// Wallet-bridge crypto benchmarks for RidePay.
//
// Covers the per-connection key agreement, sealing and opening sign requests
// at realistic transaction sizes, and the AES-GCM store round trip.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use ridepay_protocol::crypto::{
    decrypt, derive_shared_key, derive_storage_key, encrypt, open, seal, BridgeKeypair,
};

fn bench_key_agreement(c: &mut Criterion) {
    let app = BridgeKeypair::generate();
    let wallet = BridgeKeypair::generate().public_key();

    c.bench_function("x25519/derive_shared_key", |b| {
        b.iter(|| derive_shared_key(&app, &wallet).unwrap());
    });
}

fn bench_seal_open(c: &mut Criterion) {
    let app = BridgeKeypair::generate();
    let wallet = BridgeKeypair::generate();
    let key = derive_shared_key(&app, &wallet.public_key()).unwrap();

    let mut group = c.benchmark_group("nacl_box");
    // A bare transfer, a typical one, and something near the packet limit.
    for size in [256usize, 512, 1232] {
        let plaintext = vec![0x42u8; size];
        let sealed = seal(&key, &plaintext).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("seal", size), &plaintext, |b, p| {
            b.iter(|| seal(&key, p).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("open", size), &sealed, |b, s| {
            b.iter(|| open(&key, &s.nonce, &s.data).unwrap());
        });
    }
    group.finish();
}

fn bench_store_encryption(c: &mut Criterion) {
    let key = derive_storage_key(b"bench secret");
    let record = vec![7u8; 160];
    let sealed = encrypt(&key, &record, b"phantom").unwrap();

    c.bench_function("aes_gcm/encrypt_record", |b| {
        b.iter(|| encrypt(&key, &record, b"phantom").unwrap());
    });
    c.bench_function("aes_gcm/decrypt_record", |b| {
        b.iter(|| decrypt(&key, &sealed, b"phantom").unwrap());
    });
}

criterion_group!(
    benches,
    bench_key_agreement,
    bench_seal_open,
    bench_store_encryption,
);
criterion_main!(benches);
