use common::{ItemId, VariantId};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use domain::{
    Cart, CartLine, CartMode, Coupon, Money, ProductSnapshot, ShippingMode, ShippingRates,
    compute_totals, merge_carts,
};
use std::hint::black_box;

fn make_cart(mode: CartMode, lines: u64, offset: u64) -> Cart {
    let lines = (0..lines).map(|i| {
        let product = ProductSnapshot::item(
            ItemId::new(i + offset),
            format!("Item {i}"),
            Money::from_cents(199 + i as i64 * 37),
        )
        .with_variant(VariantId::new(i % 3), None)
        .with_stock(50);
        CartLine::from_product(&product, (i % 5) as u32 + 1).unwrap()
    });
    Cart::from_lines(mode, lines)
}

fn bench_compute_totals(c: &mut Criterion) {
    let rates = ShippingRates::default();
    let coupon = Coupon::percentage("save10", 10).with_min_order(Money::from_cents(1000));
    let mut group = c.benchmark_group("pricing/compute_totals");

    for size in [1u64, 10, 100] {
        let cart = make_cart(CartMode::Synced, size, 0);
        group.bench_with_input(BenchmarkId::from_parameter(size), &cart, |b, cart| {
            b.iter(|| {
                compute_totals(
                    black_box(cart.lines()),
                    Some(&coupon),
                    ShippingMode::Delivery,
                    &rates,
                )
            });
        });
    }
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let server = make_cart(CartMode::Synced, 50, 0);
    let guest = make_cart(CartMode::Guest, 50, 25);

    c.bench_function("cart/merge_50_into_50", |b| {
        b.iter(|| merge_carts(black_box(&server), black_box(&guest)));
    });
}

criterion_group!(benches, bench_compute_totals, bench_merge);
criterion_main!(benches);
