//! Graph Compute Benchmark Suite
//!
//! Benchmarks covering:
//! - Evaluating a neural network predictor node directly
//! - Evaluating the same predictor after refinement to primitives
//! - The refinement pass itself
//! - Archive round trips
//!
//! Run with: `cargo bench --bench graph_compute_bench`

use std::hint::black_box;
use std::time::{Duration, Instant};

use graphforge::graph::{
    Archiver, Model, ModelBuilder, ModelTransformer, NodeId, PortData, PortType, TensorShape,
    Unarchiver,
};
use graphforge::neural::{
    ActivationType, ConvolutionalParameters, Layer, NeuralNetworkPredictor, PoolingType,
};
use graphforge::ForgeResult;

// ============================================================================
// Benchmark Harness
// ============================================================================

struct Benchmark {
    name: String,
    iterations: usize,
    warmup_iterations: usize,
}

impl Benchmark {
    fn new(name: &str, iterations: usize) -> Self {
        Benchmark {
            name: name.to_string(),
            iterations,
            warmup_iterations: iterations.min(10),
        }
    }

    fn run_time<F, R>(&self, mut f: F) -> BenchmarkResult
    where
        F: FnMut() -> R,
    {
        for _ in 0..self.warmup_iterations {
            black_box(f());
        }

        let mut durations = Vec::with_capacity(self.iterations);
        for _ in 0..self.iterations {
            let start = Instant::now();
            black_box(f());
            durations.push(start.elapsed());
        }

        BenchmarkResult {
            name: self.name.clone(),
            iterations: self.iterations,
            durations,
        }
    }
}

struct BenchmarkResult {
    name: String,
    iterations: usize,
    durations: Vec<Duration>,
}

impl BenchmarkResult {
    fn report(&self) {
        let mut sorted = self.durations.clone();
        sorted.sort();
        let total: Duration = sorted.iter().sum();
        let avg = total / self.iterations.max(1) as u32;
        let min = sorted.first().copied().unwrap_or_default();
        let max = sorted.last().copied().unwrap_or_default();
        let percentile = |p: usize| {
            sorted
                .get((sorted.len() * p) / 100)
                .copied()
                .unwrap_or(max)
        };

        println!("\n=== {} ===", self.name);
        println!("Iterations: {}", self.iterations);
        println!("Average: {:?} ({:.3} ms)", avg, avg.as_secs_f64() * 1000.0);
        println!("Min:     {:?} ({:.3} ms)", min, min.as_secs_f64() * 1000.0);
        println!("Max:     {:?} ({:.3} ms)", max, max.as_secs_f64() * 1000.0);
        println!("P50:     {:?}", percentile(50));
        println!("P95:     {:?}", percentile(95));
        println!("P99:     {:?}", percentile(99));

        if avg.as_nanos() > 0 {
            println!("Throughput: {:.2} ops/sec", 1_000_000_000.0 / avg.as_nanos() as f64);
        }
    }
}

// ============================================================================
// Model Construction
// ============================================================================

fn weights(n: usize, phase: f64) -> Vec<f64> {
    (0..n).map(|i| ((i as f64 * 0.37 + phase).sin()) * 0.1).collect()
}

/// conv -> BN -> relu -> max pool -> FC -> softmax on a 16x16x3 input
fn predictor_model() -> ForgeResult<(Model, NodeId, NodeId)> {
    let shape = TensorShape::new(16, 16, 3);
    let conv = Layer::convolutional(
        shape,
        ConvolutionalParameters {
            receptive_field: 3,
            stride: 1,
            padding: 1,
            num_filters: 8,
        },
        weights(3 * 3 * 3 * 8, 0.0),
    )?;
    let conv_shape = conv.output_shape();
    let pool = Layer::pooling(conv_shape, 2, 2, 0, PoolingType::Max)?;
    let pooled = pool.output_shape();
    let layers = vec![
        conv,
        Layer::batch_normalization(conv_shape, weights(8, 1.0), vec![1.0; 8], 1e-3)?,
        Layer::activation(conv_shape, ActivationType::Relu)?,
        pool,
        Layer::fully_connected(
            pooled,
            TensorShape::vector(10),
            weights(pooled.size() * 10, 2.0),
            Some(weights(10, 3.0)),
        )?,
        Layer::softmax(TensorShape::vector(10))?,
    ];
    let predictor = NeuralNetworkPredictor::new(shape, layers)?;

    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let input = builder.add_input_node(&mut model, shape, PortType::Float32)?;
    let input_out = model.output(input)?;
    let node = builder.add_neural_network_predictor_node(&mut model, &input_out, predictor)?;
    Ok((model, input, node))
}

// ============================================================================
// Benchmarks
// ============================================================================

fn benchmark_predictor_compute() -> ForgeResult<()> {
    let (mut model, input, _) = predictor_model()?;
    let x = PortData::from_f64s(PortType::Float32, &weights(16 * 16 * 3, 4.0));
    model.set_input_value(input, x)?;

    let bench = Benchmark::new("Predictor node compute (16x16x3)", 200);
    bench.run_time(|| model.compute().is_ok()).report();
    Ok(())
}

fn benchmark_refined_compute() -> ForgeResult<()> {
    let (model, input, _) = predictor_model()?;
    let mut transformer = ModelTransformer::default();
    let mut refined = transformer.refine_model(&model)?;
    let translated = transformer.get_corresponding_outputs(&model.output(input)?)?;
    let new_input = translated.ranges()[0].port.node;
    let x = PortData::from_f64s(PortType::Float32, &weights(16 * 16 * 3, 4.0));
    refined.set_input_value(new_input, x)?;

    println!(
        "\nRefined {} nodes into {} in {} passes",
        transformer.stats().source_nodes,
        refined.len(),
        transformer.stats().passes
    );
    let bench = Benchmark::new("Refined model compute (16x16x3)", 200);
    bench.run_time(|| refined.compute().is_ok()).report();
    Ok(())
}

fn benchmark_refinement() -> ForgeResult<()> {
    let (model, _, _) = predictor_model()?;
    let bench = Benchmark::new("Refine predictor to primitives", 50);
    bench
        .run_time(|| ModelTransformer::default().refine_model(&model).map(|m| m.len()))
        .report();
    Ok(())
}

fn benchmark_archive_round_trip() -> ForgeResult<()> {
    let (model, _, _) = predictor_model()?;
    let json = Archiver::new().to_json(&model)?;
    println!("\nArchive size: {} bytes", json.len());

    Benchmark::new("Archive to JSON", 100)
        .run_time(|| Archiver::new().to_json(&model).map(|s| s.len()))
        .report();
    Benchmark::new("Unarchive from JSON", 100)
        .run_time(|| Unarchiver::new().from_json(&json).map(|m| m.len()))
        .report();
    Ok(())
}

fn main() {
    println!("====================================");
    println!("GraphForge Compute Benchmark Suite");
    println!("====================================");

    let suites: [(&str, fn() -> ForgeResult<()>); 4] = [
        ("predictor compute", benchmark_predictor_compute),
        ("refined compute", benchmark_refined_compute),
        ("refinement", benchmark_refinement),
        ("archive round trip", benchmark_archive_round_trip),
    ];
    for (name, suite) in suites {
        if let Err(err) = suite() {
            eprintln!("benchmark '{}' failed: {}", name, err);
        }
    }

    println!("\n====================================");
    println!("Benchmark Complete");
    println!("====================================");
}
