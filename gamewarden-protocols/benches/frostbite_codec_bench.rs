#[macro_use]
extern crate criterion;

use bytes::BytesMut;
use criterion::{black_box, Criterion};

use gamewarden_protocols::{punkbuster, Packet};

fn bench_codec(c: &mut Criterion) {
    let chat = Packet::request(
        42,
        ["player.onChat", "Joe", "gg everyone, nice round", "team", "1"],
    );
    let encoded = chat.encode().unwrap();

    c.bench_function("frostbite_encode_chat", |b| {
        b.iter(|| black_box(&chat).encode().unwrap())
    });

    c.bench_function("frostbite_decode_chat", |b| {
        b.iter(|| {
            let mut buf = BytesMut::from(&encoded[..]);
            Packet::decode(black_box(&mut buf)).unwrap()
        })
    });
}

fn bench_punkbuster_routing(c: &mut Criterion) {
    let table = punkbuster::table().unwrap();
    let line = "PunkBuster Server: Player GUID Computed 0837c128293d42aaaaaaaaaaaaaaaaa(-) (slot #1) 11.122.103.24:3659 Joe";
    c.bench_function("punkbuster_route_guid", |b| {
        b.iter(|| matches!(table.route(black_box(line)), gamewarden_protocols::Route::Handled(..)))
    });
}

criterion_group!(benches, bench_codec, bench_punkbuster_routing);
criterion_main!(benches);
