//! Full benchmark run: CSV panel, mock remote API and local baselines

use chrono::{Duration, NaiveDate, NaiveDateTime};
use forecast_bench::config::{Config, DataConfig};
use forecast_bench::domain::Frequency;
use forecast_bench::evaluation::{Evaluator, GapKind};
use forecast_bench::forecast::{
    ForecastEngine, ForecastProvider, LocalModelConfig, LocalStatsProvider, Metric, MetricKind, ModelKind,
    RemoteForecastProvider,
};
use forecast_bench::io::read_panel_csv;
use forecast_bench::transform::{Identity, TransformKind};
use forecast_bench::{BenchmarkPipeline, PipelineError};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const HORIZON: usize = 28;
const POINTS: usize = 40;

/// Answers every request with the mean of each series' history.
struct TrainMean;

impl Respond for TrainMean {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let fh = body["fh"].as_i64().unwrap();

        let mut history: BTreeMap<String, (Vec<f64>, NaiveDateTime)> = BTreeMap::new();
        for row in body["y"].as_array().unwrap() {
            let ds = NaiveDateTime::parse_from_str(row["ds"].as_str().unwrap(), "%Y-%m-%dT%H:%M:%S").unwrap();
            let entry = history
                .entry(row["unique_id"].as_str().unwrap().to_string())
                .or_insert((Vec::new(), ds));
            entry.0.push(row["y"].as_f64().unwrap());
            entry.1 = entry.1.max(ds);
        }

        let data: Vec<Value> = history
            .iter()
            .flat_map(|(id, (values, last))| {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                (1..=fh).map(move |h| {
                    json!({
                        "unique_id": id,
                        "ds": (*last + Duration::days(h)).format("%Y-%m-%dT%H:%M:%S").to_string(),
                        "value": mean,
                    })
                })
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
    }
}

fn series_value(id: &str, i: usize) -> f64 {
    match id {
        "A" => 100.0 + (i % 7) as f64 * 3.0,
        _ => 20.0 + i as f64 * 0.5,
    }
}

fn panel_csv() -> String {
    let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    let mut csv = String::from("unique_id,ds,y\n");
    for id in ["A", "B"] {
        for i in 0..POINTS {
            let ds = start + Duration::days(i as i64);
            csv.push_str(&format!("{id},{ds},{}\n", series_value(id, i)));
        }
    }
    csv
}

/// Mean absolute deviation of the holdout from the training mean, averaged over series.
fn expected_mae() -> f64 {
    let cut = POINTS - HORIZON;
    let per_series: Vec<f64> = ["A", "B"]
        .iter()
        .map(|id| {
            let values: Vec<f64> = (0..POINTS).map(|i| series_value(id, i)).collect();
            let mean = values[..cut].iter().sum::<f64>() / cut as f64;
            values[cut..].iter().map(|v| (v - mean).abs()).sum::<f64>() / HORIZON as f64
        })
        .collect();
    per_series.iter().sum::<f64>() / per_series.len() as f64
}

fn config(server: &MockServer) -> Config {
    let mut cfg = Config::default();
    cfg.pipeline.horizon = HORIZON;
    cfg.pipeline.levels = vec![];
    cfg.pipeline.transform = TransformKind::Identity;
    cfg.pipeline.metrics = vec![MetricKind::Mae];
    cfg.remote.base_url = server.uri();
    cfg.remote.max_retries = 0;
    cfg.local.parallel = true;
    cfg.local.models = vec![LocalModelConfig::new(ModelKind::HistoricAverage)];
    cfg
}

#[tokio::test]
async fn remote_and_local_mean_forecasts_score_identically() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/forecast"))
        .respond_with(TrainMean)
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server);
    cfg.check().unwrap();
    let panel = read_panel_csv(panel_csv().as_bytes(), &DataConfig::default()).unwrap();
    let report = BenchmarkPipeline::from_config(&cfg).unwrap().run(&panel).await.unwrap();

    let expected = expected_mae();
    for model in ["TimeGPT", "HistoricAverage"] {
        let entry = report.summary.get("mae", model).unwrap();
        assert!(
            (entry.value - expected).abs() < 1e-9,
            "{model}: got {}, expected {expected}",
            entry.value
        );
        assert_eq!(entry.record_count, 2);
    }
    assert!(report.evaluation.gaps.is_empty());
    assert!(report.provider_failures.is_empty());
    assert_eq!(report.evaluation.records.len(), 4);
}

#[tokio::test]
async fn remote_outage_leaves_local_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let panel = read_panel_csv(panel_csv().as_bytes(), &DataConfig::default()).unwrap();
    let report = BenchmarkPipeline::from_config(&config(&server))
        .unwrap()
        .run(&panel)
        .await
        .unwrap();

    assert_eq!(report.provider_failures.len(), 1);
    assert_eq!(report.provider_failures[0].provider, "TimeGPT");
    assert!(report.summary.get("mae", "TimeGPT").is_none());
    assert!((report.summary.get("mae", "HistoricAverage").unwrap().value - expected_mae()).abs() < 1e-9);
    assert_eq!(report.evaluation.gap_count(GapKind::MissingForecast), 0);
}

#[tokio::test]
async fn short_series_abort_the_run() {
    let server = MockServer::start().await;
    let mut cfg = config(&server);
    cfg.pipeline.horizon = POINTS;

    let panel = read_panel_csv(panel_csv().as_bytes(), &DataConfig::default()).unwrap();
    let err = BenchmarkPipeline::from_config(&cfg).unwrap().run(&panel).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InsufficientHistory { len: 40, required: 41, .. }
    ));
}

fn promo(id: &str, i: usize) -> f64 {
    match id {
        "A" => (i % 3) as f64,
        _ => (i % 2) as f64,
    }
}

fn exogenous_panel_csv() -> String {
    let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    let mut csv = String::from("unique_id,ds,y,promo\n");
    for id in ["A", "B"] {
        for i in 0..POINTS {
            let ds = start + Duration::days(i as i64);
            csv.push_str(&format!("{id},{ds},{},{}\n", series_value(id, i), promo(id, i)));
        }
    }
    csv
}

/// Future exogenous rows expected for the holdout, in (series, timestamp) order.
fn expected_future_rows() -> Vec<Value> {
    let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    ["A", "B"]
        .iter()
        .flat_map(|id| {
            (POINTS - HORIZON..POINTS).map(move |i| {
                json!({
                    "unique_id": id,
                    "ds": (start + Duration::days(i as i64)).format("%Y-%m-%dT%H:%M:%S").to_string(),
                    "promo": promo(id, i),
                })
            })
        })
        .collect()
}

#[tokio::test]
async fn holdout_exogenous_values_sent_as_future_rows() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/forecast"))
        .and(body_partial_json(json!({ "x": expected_future_rows() })))
        .respond_with(TrainMean)
        .expect(1)
        .mount(&server)
        .await;

    let panel = read_panel_csv(exogenous_panel_csv().as_bytes(), &DataConfig::default()).unwrap();
    assert_eq!(panel.exogenous_columns(), ["promo".to_string()]);
    let report = BenchmarkPipeline::from_config(&config(&server))
        .unwrap()
        .run(&panel)
        .await
        .unwrap();

    assert!(report.provider_failures.is_empty());
    // local baselines ignore the exogenous column and still score like the remote mean
    let expected = expected_mae();
    for model in ["TimeGPT", "HistoricAverage"] {
        assert!((report.summary.get("mae", model).unwrap().value - expected).abs() < 1e-9);
    }

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["x"].as_array().unwrap().len(), 2 * HORIZON);
    assert_eq!(body["y"].as_array().unwrap().len(), 2 * (POINTS - HORIZON));
    assert!(body["y"][0].get("promo").is_some());
}

#[tokio::test]
async fn disabled_exogenous_columns_are_not_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/forecast"))
        .respond_with(TrainMean)
        .expect(1)
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.pipeline.use_exogenous = false;
    let panel = read_panel_csv(exogenous_panel_csv().as_bytes(), &DataConfig::default()).unwrap();
    let report = BenchmarkPipeline::from_config(&cfg).unwrap().run(&panel).await.unwrap();
    assert!(report.provider_failures.is_empty());
    assert!(report.summary.get("mae", "HistoricAverage").is_some());

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("x").is_none());
    assert!(body["y"]
        .as_array()
        .unwrap()
        .iter()
        .all(|row| row.get("promo").is_none()));
}

#[tokio::test]
async fn remote_and_local_sharing_a_model_id_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/forecast"))
        .respond_with(TrainMean)
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.remote.model_id = "HistoricAverage".into();
    assert!(cfg.check().is_err());
    assert!(matches!(BenchmarkPipeline::from_config(&cfg), Err(PipelineError::Config(_))));

    // assembled by hand, the engine still refuses to merge the two models
    let providers: Vec<Box<dyn ForecastProvider>> = vec![
        Box::new(RemoteForecastProvider::new(&cfg.remote).unwrap()),
        Box::new(LocalStatsProvider::from_configs(&cfg.local.models, false).unwrap()),
    ];
    let pipeline = BenchmarkPipeline::new(
        Arc::new(Identity),
        ForecastEngine::new(providers),
        Evaluator::new(vec![Arc::new(MetricKind::Mae) as Arc<dyn Metric>]),
        HORIZON,
        Frequency::Day,
    );
    let panel = read_panel_csv(panel_csv().as_bytes(), &DataConfig::default()).unwrap();
    match pipeline.run(&panel).await {
        Err(PipelineError::Config(msg)) => assert!(msg.contains("HistoricAverage")),
        other => panic!("expected config error, got {other:?}"),
    }
}
