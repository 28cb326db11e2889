//! Benchmark for transpose elimination
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use onnx_layout_optimizer::graph::GraphContext;
use onnx_layout_optimizer::optimize;
use onnx_layout_optimizer::proto::extensions::{make_node, make_tensor_value_info};
use onnx_layout_optimizer::proto::{GraphProto, ModelProto, NodeProto, OperatorSetIdProto};

fn transpose_node(name: &str, input: &str, output: &str, perm: &[i64]) -> NodeProto {
    let mut node = make_node("Transpose", &[input], &[output], name);
    node.set_attribute_ints("perm", perm.to_vec());
    node
}

/// Alternating Transpose/Relu chain: every pair collapses during the pass
fn make_chain_model(layers: usize) -> ModelProto {
    let mut nodes = Vec::with_capacity(layers * 2);
    let mut current = "X".to_string();
    for i in 0..layers {
        let t_out = format!("t_{i}");
        let r_out = if i + 1 == layers {
            "Y".to_string()
        } else {
            format!("r_{i}")
        };
        nodes.push(transpose_node(
            &format!("transpose_{i}"),
            &current,
            &t_out,
            &[0, 2, 3, 1],
        ));
        nodes.push(make_node("Relu", &[&t_out], &[&r_out], &format!("relu_{i}")));
        current = r_out;
    }

    ModelProto {
        graph: Some(GraphProto {
            name: "chain".to_string(),
            node: nodes,
            input: vec![make_tensor_value_info("X", 1, &[1, 3, 32, 32])],
            output: vec![make_tensor_value_info("Y", 1, &[1, 32, 32, 3])],
            ..Default::default()
        }),
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: 13,
        }],
        ..Default::default()
    }
}

fn optimize_benchmark(c: &mut Criterion) {
    let model = make_chain_model(32);

    c.bench_function("optimize_transpose_chain_32", |b| {
        b.iter(|| {
            let mut graph = GraphContext::from_model(&model).unwrap();
            black_box(optimize(&mut graph, false))
        })
    });

    c.bench_function("build_context_chain_32", |b| {
        b.iter(|| black_box(GraphContext::from_model(&model).unwrap()))
    });
}

criterion_group!(benches, optimize_benchmark);
criterion_main!(benches);
