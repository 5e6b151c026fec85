//! Criterion benchmarks for u-configsearch.
//!
//! Uses synthetic catalogs and a closed-form evaluator to measure search
//! overhead independent of any real evaluation cost.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use u_configsearch::error::EvaluationError;
use u_configsearch::model::{Catalog, Component, ComponentInstance, NumericDomain, Parameter};
use u_configsearch::orchestrator::{OrchestratorConfig, SearchOrchestrator};
use u_configsearch::reduction::ConfigurationProblem;
use u_configsearch::refinement::{refine_numeric, RefinementConfig, RefinementConfigMap};
use u_configsearch::search::{ObjectEvaluator, SearchConfig};

// ===========================================================================
// Synthetic problem: pipeline of a preprocessor and a learner
// ===========================================================================

fn pipeline_problem(learners: usize) -> ConfigurationProblem {
    let mut components = vec![
        Component::new("Pipeline")
            .provides("Root")
            .requires("pre", "Preprocessor")
            .requires("learner", "Learner"),
        Component::new("Scaler").provides("Preprocessor"),
        Component::new("Pca")
            .provides("Preprocessor")
            .with_parameter(Parameter::integer("components", 1, 64, 8)),
    ];
    let mut refinement = RefinementConfigMap::new()
        .with("Pca", "components", RefinementConfig::linear(16.0, 4));
    for i in 0..learners {
        let name = format!("Learner{i}");
        components.push(
            Component::new(name.clone())
                .provides("Learner")
                .with_parameter(Parameter::numeric("c", 0.001, 1000.0, 1.0)),
        );
        refinement.insert(&name, "c", RefinementConfig::logarithmic(2.0, 4, 10.0));
    }
    let catalog = Catalog::new(components).expect("valid catalog");
    ConfigurationProblem::new(catalog, "Root", refinement).expect("valid problem")
}

fn synthetic_loss() -> Arc<dyn ObjectEvaluator> {
    Arc::new(|inst: &ComponentInstance| -> Result<f64, EvaluationError> {
        let learner = inst
            .child("learner")
            .ok_or_else(|| EvaluationError::failed("no learner"))?;
        let c = learner.numeric_value("c").unwrap_or(1.0);
        Ok((c.log10() - 1.0).abs() + learner.component().name.len() as f64 * 0.01)
    })
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_refine_numeric(c: &mut Criterion) {
    let mut group = c.benchmark_group("refine_numeric");

    let domain = NumericDomain::real(0.001, 1000.0);
    for (label, config) in [
        ("linear", RefinementConfig::linear(0.01, 8)),
        ("log", RefinementConfig::logarithmic(0.01, 8, 2.0)),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(label), &config, |b, cfg| {
            b.iter(|| black_box(refine_numeric(black_box(&domain), cfg, 0.001, false)))
        });
    }
    group.finish();
}

fn bench_search_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_pipeline");
    group.sample_size(10);

    for &learners in &[2usize, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(learners), &learners, |b, &n| {
            b.iter(|| {
                let config = OrchestratorConfig::default()
                    .with_search(SearchConfig::default().with_seed(42));
                let orchestrator = SearchOrchestrator::new(pipeline_problem(n), synthetic_loss(), config)
                    .expect("valid orchestrator");
                black_box(orchestrator.run(None))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_refine_numeric, bench_search_pipeline);
criterion_main!(benches);
