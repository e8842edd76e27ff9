use bulkstore::crypto::{aes256_cbc_decrypt, aes256_cbc_encrypt, random_iv, random_key, rsa_decrypt, rsa_encrypt};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_aes_cbc(c: &mut Criterion) {
    let key = random_key();
    let iv = random_iv();
    let data = vec![0u8; 1024 * 1024];

    c.bench_function("aes256_cbc_encrypt_1mb", |b| {
        b.iter(|| aes256_cbc_encrypt(&key, &iv, black_box(&data)))
    });

    let ciphertext = aes256_cbc_encrypt(&key, &iv, &data);
    c.bench_function("aes256_cbc_decrypt_1mb", |b| {
        b.iter(|| aes256_cbc_decrypt(&key, &iv, black_box(&ciphertext)).unwrap())
    });
}

fn bench_rsa_oaep(c: &mut Criterion) {
    let (priv_pem, pub_pem) = bulkstore::crypto::gen_key("bench-pass").unwrap();
    let private_key = bulkstore::crypto::load_private_key(&priv_pem, "bench-pass").unwrap();
    let public_key = bulkstore::crypto::load_public_key(&pub_pem).unwrap();
    let plaintext = vec![0u8; 256];

    c.bench_function("rsa4096_oaep_encrypt_256b", |b| {
        b.iter(|| rsa_encrypt(&public_key, black_box(&plaintext)).unwrap())
    });

    let ciphertext = rsa_encrypt(&public_key, &plaintext).unwrap();
    c.bench_function("rsa4096_oaep_decrypt_256b", |b| {
        b.iter(|| rsa_decrypt(&private_key, black_box(&ciphertext)).unwrap())
    });
}

criterion_group!(benches, bench_aes_cbc, bench_rsa_oaep);
criterion_main!(benches);
