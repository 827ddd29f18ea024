//! End-to-end tests: preprocessing through training, checkpointing and
//! inference.

use tasar::autograd::Tensor;
use tasar::graph::{CircuitGraph, GraphBatch, ProcessedGraph};
use tasar::model::{PredictorConfig, QorPredictor};
use tasar::nn::{Adam, Module};
use tasar::serialize::{load_model, save_model};
use tasar::train::{evaluate, train_epoch};

fn config() -> PredictorConfig {
    PredictorConfig {
        in_features: 2,
        embed_dim: 8,
        num_heads: 2,
        num_layers: 2,
        num_hops: 2,
        directed: false,
        dropout: 0.0,
        attn_dropout: 0.0,
        fc_hidden: 16,
        num_fc_layers: 3,
        seed: Some(42),
    }
}

fn processed(seed: usize, target: f32) -> ProcessedGraph {
    let n = 4;
    let edges = vec![[0, 1], [1, 2], [2, 3], [0, 3]];
    let graph = CircuitGraph::new(n, edges, false).expect("valid graph");
    let data: Vec<f32> = (0..n * 2)
        .map(|i| ((i + seed * 7) % 5) as f32 * 0.25)
        .collect();
    let features = Tensor::new(&data, &[n, 2]);
    ProcessedGraph::new(&graph, &features, 2, target).expect("processed")
}

#[test]
fn training_reduces_loss_on_small_dataset() {
    let mut model = QorPredictor::new(&config()).expect("model");
    let mut opt = Adam::new(model.parameters_mut(), 5e-3);

    let graphs = [
        processed(0, 0.2),
        processed(1, 0.4),
        processed(2, 0.6),
        processed(3, 0.8),
    ];
    let batches = vec![
        GraphBatch::from_graphs(&[&graphs[0], &graphs[1]]).expect("batch"),
        GraphBatch::from_graphs(&[&graphs[2], &graphs[3]]).expect("batch"),
    ];

    let initial = evaluate(&mut model, &batches).expect("initial eval");
    for _ in 0..60 {
        train_epoch(&mut model, &batches, &mut opt).expect("epoch");
    }
    let trained = evaluate(&mut model, &batches).expect("final eval");

    assert!(
        trained < initial,
        "training should reduce MSE: initial {initial}, trained {trained}"
    );
}

#[test]
fn checkpoint_roundtrip_reproduces_predictions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("model.safetensors");

    let mut model = QorPredictor::new(&config()).expect("model");
    let mut opt = Adam::new(model.parameters_mut(), 1e-3);
    let batch = GraphBatch::from_graphs(&[&processed(0, 0.3)]).expect("batch");
    train_epoch(&mut model, &[batch.clone()], &mut opt).expect("epoch");

    model.eval();
    let before = model.forward(&batch);
    save_model(&model, &path).expect("save");

    // Fresh model with different seed, same architecture.
    let mut restored = QorPredictor::new(&PredictorConfig {
        seed: Some(777),
        ..config()
    })
    .expect("restored model");
    restored.eval();
    load_model(&mut restored, &path).expect("load");

    let after = restored.forward(&batch);
    assert_eq!(
        before.data(),
        after.data(),
        "save→load must reproduce bit-identical predictions"
    );
}

#[test]
fn eval_forward_is_deterministic() {
    let mut model = QorPredictor::new(&PredictorConfig {
        dropout: 0.4,
        attn_dropout: 0.2,
        ..config()
    })
    .expect("model");
    model.eval();

    let batch = GraphBatch::from_graphs(&[&processed(2, 0.5)]).expect("batch");
    let p1 = model.forward(&batch);
    let p2 = model.forward(&batch);
    assert_eq!(p1.data(), p2.data());
}

#[test]
fn batched_prediction_matches_individual_graphs() {
    // Attention runs per node and pooling per graph, so stacking graphs
    // into one batch must not change any graph's prediction.
    let mut model = QorPredictor::new(&config()).expect("model");
    model.eval();

    let g1 = processed(0, 0.1);
    let g2 = processed(5, 0.9);

    let together = model.forward(&GraphBatch::from_graphs(&[&g1, &g2]).expect("batch"));
    let alone1 = model.forward(&GraphBatch::from_graphs(&[&g1]).expect("batch"));
    let alone2 = model.forward(&GraphBatch::from_graphs(&[&g2]).expect("batch"));

    assert!((together.data()[0] - alone1.data()[0]).abs() < 1e-5);
    assert!((together.data()[1] - alone2.data()[0]).abs() < 1e-5);
}

#[test]
fn directed_pipeline_end_to_end() {
    let cfg = PredictorConfig {
        directed: true,
        ..config()
    };
    let mut model = QorPredictor::new(&cfg).expect("model");
    model.eval();

    let graph = CircuitGraph::new(3, vec![[0, 1], [1, 2]], true).expect("valid");
    let features = Tensor::new(&[1.0, 0.0, 0.5, 0.5, 0.0, 1.0], &[3, 2]);
    let p = ProcessedGraph::new(&graph, &features, 2, 0.4).expect("processed");
    assert_eq!(p.seq_len(), 5);

    let batch = GraphBatch::from_graphs(&[&p]).expect("batch");
    let pred = model.forward(&batch);
    assert_eq!(pred.shape(), &[1, 1]);
    assert!(pred.is_finite());
}

#[test]
fn hop_weights_are_a_distribution_after_training() {
    let mut model = QorPredictor::new(&config()).expect("model");
    let mut opt = Adam::new(model.parameters_mut(), 1e-3);
    let batch = GraphBatch::from_graphs(&[&processed(1, 0.6)]).expect("batch");
    for _ in 0..5 {
        train_epoch(&mut model, &[batch.clone()], &mut opt).expect("epoch");
    }

    model.eval();
    let (_, weights) = model.forward_with_attention(&batch);
    let hops = weights.shape()[1];
    for node in 0..weights.shape()[0] {
        let row = &weights.data()[node * hops..(node + 1) * hops];
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(row.iter().all(|&w| (0.0..=1.0).contains(&w)));
    }
}
