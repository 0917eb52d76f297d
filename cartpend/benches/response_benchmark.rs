use criterion::*;
use nalgebra::DVector;

use cartpend::control::{feedback, pid};
use cartpend::expr::Symbol;
use cartpend::model::CartPole;
use cartpend::response::{time_response, InputTransform};
use cartpend::symtf::SymbolicTransferFunction;
use cartpend::tf::TransferFunction;

fn linearize_benchmark(c: &mut Criterion) {
    c.bench_function("linearize", |b| {
        b.iter(|| black_box(&CartPole::new()).linearize())
    });
}

fn time_response_benchmark(c: &mut Criterion) {
    let gains = CartPole::new().linearize().unwrap();
    let tf = SymbolicTransferFunction::force_to_position(&gains);
    let t = Symbol::new("t");
    c.bench_function("position_step_response", |b| {
        b.iter(|| time_response(black_box(&tf), &InputTransform::Step, &t))
    });
}

fn closed_loop_benchmark(c: &mut Criterion) {
    let model = CartPole::new();
    let gains = model
        .linearize()
        .unwrap()
        .eval(model.symbols(), &Default::default())
        .unwrap();
    let plant = TransferFunction::force_to_angle(&gains).unwrap();
    let controller = -&pid(125.0, 0.2, 9.0);
    let closed = feedback(&plant, &controller).unwrap();
    let t = DVector::from_fn(500, |i, _| i as f64 / 499.0);
    c.bench_function("closed_loop_impulse", |b| {
        b.iter(|| black_box(&closed).impulse_response(&t))
    });
}

criterion_group!(
    benches,
    linearize_benchmark,
    time_response_benchmark,
    closed_loop_benchmark
);

criterion_main!(benches);
