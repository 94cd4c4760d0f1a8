//! Push propagation benchmarks
//!
//! - One publish fanning out to many readers
//! - One manual tick through a reference/feedback/gain chain
//! - Rewiring a sink between two controllables

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ligament_core::execution::{ExecutionManager, ManualExecutionManager};
use ligament_core::port::{connect, Input, Output};
use ligament_core::supervisory::{Controllable, SupervisoryController};
use ligament_core::system::{Node, Ports, System};
use ligament_core::systems::{Constant, Gain, Summer};
use ligament_core::Result;

struct Reader {
    input: Input<[f64; 7]>,
    last: [f64; 7],
}

impl System for Reader {
    fn operate(&mut self) -> Result<()> {
        self.last = self.input.get_value()?;
        Ok(())
    }
}

fn reader(ports: &Ports) -> Reader {
    Reader {
        input: ports.input(),
        last: [0.0; 7],
    }
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for readers in [1, 8, 64] {
        let source = Node::new("source", |ports| Constant::new(ports, [0.0; 7]));
        let output: Output<[f64; 7]> = source.lock().output.clone();
        let nodes: Vec<_> = (0..readers)
            .map(|i| {
                let node = Node::new(format!("reader{i}"), reader);
                connect(&output, &node.lock().input.clone()).unwrap();
                node
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(readers), &readers, |b, _| {
            let mut value = 0.0;
            b.iter(|| {
                value += 1.0;
                output.set_value(black_box([value; 7])).unwrap();
            })
        });
        drop(nodes);
    }
    group.finish();
}

fn bench_control_tick(c: &mut Criterion) {
    let reference = Node::new("reference", |ports| Constant::new(ports, [38.0; 7]));
    let feedback = Node::new("feedback", |ports| Constant::new(ports, [0.0; 7]));
    let error = Node::new("error", Summer::<[f64; 7]>::new);
    let kp = Node::new("kp", |ports| Gain::new(ports, [38.0; 7]));
    let sink = Node::new("sink", reader);

    connect(&reference.lock().output.clone(), &error.lock().reference.clone()).unwrap();
    connect(&feedback.lock().output.clone(), &error.lock().feedback.clone()).unwrap();
    connect(&error.lock().output.clone(), &kp.lock().input.clone()).unwrap();
    connect(&kp.lock().output.clone(), &sink.lock().input.clone()).unwrap();

    let mut manager = ManualExecutionManager::new();
    manager.start_managing(&reference).unwrap();
    manager.start_managing(&feedback).unwrap();

    c.bench_function("control_tick", |b| {
        b.iter(|| manager.run_execution_cycle().unwrap())
    });
    black_box(sink.lock().last);
}

fn bench_supervisory_switch(c: &mut Criterion) {
    let sink = Node::new("sink", reader);
    let x = Node::new("x", |ports| Gain::new(ports, [1.0; 7]));
    let y = Node::new("y", |ports| Gain::new(ports, [2.0; 7]));
    let reference = Node::new("reference", |ports| Constant::new(ports, [1.0; 7]));
    let source = reference.lock().output.clone();

    let controllable = |name: &str, gain: &Node<Gain<[f64; 7]>>| {
        let state = gain.lock();
        Controllable::new(name, state.input.clone(), state.output.clone())
    };
    let mut supervisor = SupervisoryController::new(&sink.lock().input.clone());
    let x_id = supervisor.register_controllable(controllable("x", &x));
    let y_id = supervisor.register_controllable(controllable("y", &y));

    let mut flip = false;
    c.bench_function("supervisory_switch", |b| {
        b.iter(|| {
            flip = !flip;
            let id = if flip { x_id } else { y_id };
            supervisor.track_reference_signal(&source, Some(id)).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_fan_out,
    bench_control_tick,
    bench_supervisory_switch
);
criterion_main!(benches);
