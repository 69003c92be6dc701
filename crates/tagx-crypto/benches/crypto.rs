use tagx_core::{KeyMaterial, LayerDescriptor, LayerMethod, Phase, SubstitutionScheme};
use tagx_crypto::{decode_recipe, derive_key, LayerCodec, Rc4Codec, XorCodec};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [64, 1024, 65536, 1048576])]
fn xor_decode(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| XorCodec.decode(divan::black_box(&data), b"\x55\xAA").unwrap());
}

#[divan::bench(args = [64, 1024, 65536, 1048576])]
fn rc4_decode(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| Rc4Codec.decode(divan::black_box(&data), b"EvonyAge2").unwrap());
}

#[divan::bench(args = [64, 1024, 65536])]
fn three_layer_recipe(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    let recipe = vec![
        LayerDescriptor {
            method: LayerMethod::Substitution(SubstitutionScheme::RotatingXor),
            key: KeyMaterial::new(vec![0x55]),
            layer_index: 0,
        },
        LayerDescriptor {
            method: LayerMethod::Rc4,
            key: KeyMaterial::new(b"Evony".to_vec()),
            layer_index: 1,
        },
        LayerDescriptor {
            method: LayerMethod::Substitution(SubstitutionScheme::PositionalXor {
                multiplier: 0x55,
            }),
            key: KeyMaterial::new(vec![0x00]),
            layer_index: 2,
        },
    ];
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| decode_recipe(&recipe, divan::black_box(&data)).unwrap());
}

#[divan::bench]
fn late_key_derivation(bencher: divan::Bencher) {
    let seed = KeyMaterial::new(b"EvonyAge2".to_vec());
    let accepted: Vec<KeyMaterial> = (0..64u8).map(|i| KeyMaterial::new(vec![i; 8])).collect();
    bencher.bench(|| {
        derive_key(396, 0x1234, Phase::Late, &seed, divan::black_box(&accepted)).unwrap()
    });
}

fn main() {
    divan::main();
}
