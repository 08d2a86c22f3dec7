use criterion::{criterion_group, criterion_main, Criterion};
use ocn_identity::{KeyPair, VerifiableCredential};

fn bench_verify(c: &mut Criterion) {
    let kp = KeyPair::generate();
    let vc = VerifiableCredential::new(
        kp.did.clone(),
        vec!["AchievementCredential".into()],
        serde_json::json!({"id": kp.did.as_str(), "name": "Benchmark"}),
    );
    let signed = vc.sign(&kp).unwrap();

    c.bench_function("vc_verify", |b| {
        b.iter(|| signed.verify().unwrap());
    });
}
criterion_group!(benches, bench_verify);
criterion_main!(benches);
