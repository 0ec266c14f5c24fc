use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use secretdevice::{AccessMode, Identity, SecretStore, SECRET_CAPACITY};

const OWNER: Identity = Identity::new(1000);
const PAYLOAD: &[u8] = b"thisismy32bytesecretthatiwilluse";

fn bench_open_close(c: &mut Criterion) {
    let mut store = SecretStore::new();

    c.bench_function("open_close", |b| {
        b.iter(|| {
            // A read-open of the empty slot claims it and the close resets it,
            // so every iteration starts from the same state.
            let handle = store.open(OWNER, AccessMode::ReadOnly).unwrap();
            store.close(handle).unwrap();
        })
    });
}

fn bench_full_cycle(c: &mut Criterion) {
    let mut store = SecretStore::new();
    let mut buf = [0u8; PAYLOAD.len()];

    c.bench_function("full_cycle", |b| {
        b.iter(|| {
            let writer = store.open(OWNER, AccessMode::WriteOnly).unwrap();
            store.write(writer, PAYLOAD).unwrap();
            store.close(writer).unwrap();

            let reader = store.open(OWNER, AccessMode::ReadOnly).unwrap();
            store.read(reader, &mut buf).unwrap();
            store.close(reader).unwrap();

            assert_eq!(&buf, PAYLOAD);
        })
    });
}

fn bench_transfer_sizes(c: &mut Criterion) {
    let sizes = [16, 64, 256, SECRET_CAPACITY];
    let mut group = c.benchmark_group("transfer");

    for size in sizes.iter() {
        let payload = vec![0x5Au8; *size];
        let mut buf = vec![0u8; *size];
        let mut store = SecretStore::new();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let writer = store.open(OWNER, AccessMode::WriteOnly).unwrap();
                store.write(writer, &payload).unwrap();
                store.close(writer).unwrap();

                let reader = store.open(OWNER, AccessMode::ReadOnly).unwrap();
                let n = store.read(reader, &mut buf).unwrap();
                store.close(reader).unwrap();

                assert_eq!(n, size);
            })
        });
    }

    group.finish();
}

fn bench_save_state(c: &mut Criterion) {
    let mut store = SecretStore::new();
    let writer = store.open(OWNER, AccessMode::WriteOnly).unwrap();
    store.write(writer, PAYLOAD).unwrap();
    let reader = store.open(OWNER, AccessMode::ReadOnly).unwrap();
    let mut buf = [0u8; 16];
    store.read(reader, &mut buf).unwrap();

    c.bench_function("save_state", |b| {
        b.iter(|| {
            let blob = store.save_state();
            assert!(!blob.is_empty());
        })
    });
}

fn bench_restore_state(c: &mut Criterion) {
    let mut store = SecretStore::new();
    let writer = store.open(OWNER, AccessMode::WriteOnly).unwrap();
    store.write(writer, PAYLOAD).unwrap();
    let blob = store.save_state();

    c.bench_function("restore_state", |b| {
        b.iter(|| {
            let mut restored = SecretStore::new();
            restored.restore_state(&blob).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_open_close,
    bench_full_cycle,
    bench_transfer_sizes,
    bench_save_state,
    bench_restore_state
);
criterion_main!(benches);
