//! HTTP surface: query, ingest, browse, stats.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::error::Error;
use crate::ledger::{Ledger, LedgerFilter};
use crate::model::Transaction;
use crate::rag::{RagEngine, DEFAULT_K};

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    k: Option<usize>,
}

#[derive(Debug)]
struct ApiError(Error);
impl warp::reject::Reject for ApiError {}

fn reject(err: Error) -> Rejection {
    warp::reject::custom(ApiError(err))
}

pub async fn run(engine: Arc<RagEngine>, ledger: Arc<Mutex<Ledger>>, addr: SocketAddr) {
    let api = routes(engine, ledger).recover(handle_rejection);
    warp::serve(api).run(addr).await;
}

pub fn routes(
    engine: Arc<RagEngine>,
    ledger: Arc<Mutex<Ledger>>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    // Paths match before methods: an unknown path must reject as
    // not-found, a known path with the wrong verb as method-not-allowed.

    // 1. POST /api/query
    let query = warp::path("api")
        .and(warp::path("query"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(handle_query);

    // 2. POST /api/transactions
    let ingest = warp::path("api")
        .and(warp::path("transactions"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and(with_ledger(ledger.clone()))
        .and_then(handle_ingest);

    // 3. GET /api/transactions
    let list = warp::path("api")
        .and(warp::path("transactions"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<LedgerFilter>())
        .and(with_ledger(ledger))
        .and_then(handle_list);

    // 4. GET /api/stats
    let stats = warp::path("api")
        .and(warp::path("stats"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_engine(engine))
        .and_then(handle_stats);

    query.or(ingest).or(list).or(stats)
}

async fn handle_query(
    req: QueryRequest,
    engine: Arc<RagEngine>,
) -> Result<impl Reply, Rejection> {
    let k = req.k.unwrap_or(DEFAULT_K);
    let outcome = engine.query(&req.query, k).await.map_err(reject)?;
    Ok(warp::reply::json(&outcome))
}

async fn handle_ingest(
    batch: Vec<Transaction>,
    engine: Arc<RagEngine>,
    ledger: Arc<Mutex<Ledger>>,
) -> Result<impl Reply, Rejection> {
    let ingested = engine.ingest(batch.clone()).await.map_err(reject)?;

    if ingested > 0 {
        // the ledger is a best-effort mirror: the vectors are already
        // persisted, so a mirror failure is logged, not returned
        let appended = match ledger.lock() {
            Ok(ledger) => ledger.append(&batch),
            Err(_) => Err(Error::internal("ledger lock poisoned")),
        };
        if let Err(e) = appended {
            warn!(error = %e, "ledger append failed after a successful ingest");
        }
    }

    Ok(warp::reply::json(
        &serde_json::json!({ "ingested": ingested }),
    ))
}

async fn handle_list(
    filter: LedgerFilter,
    ledger: Arc<Mutex<Ledger>>,
) -> Result<impl Reply, Rejection> {
    let records = ledger
        .lock()
        .map_err(|_| reject(Error::internal("ledger lock poisoned")))?
        .filtered(&filter)
        .map_err(reject)?;
    Ok(warp::reply::json(&records))
}

async fn handle_stats(engine: Arc<RagEngine>) -> Result<impl Reply, Rejection> {
    let stats = engine.stats().map_err(reject)?;
    Ok(warp::reply::json(&stats))
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Embedding { .. } | Error::Generation { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(ApiError(e)) = err.find::<ApiError>() {
        (status_for(e), e.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "route not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (
            StatusCode::BAD_REQUEST,
            "invalid query parameters".to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "method not allowed".to_string(),
        )
    } else {
        error!(rejection = ?err, "unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal error".to_string(),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "error": message })),
        status,
    ))
}

fn with_engine(
    engine: Arc<RagEngine>,
) -> impl Filter<Extract = (Arc<RagEngine>,), Error = Infallible> + Clone {
    warp::any().map(move || engine.clone())
}

fn with_ledger(
    ledger: Arc<Mutex<Ledger>>,
) -> impl Filter<Extract = (Arc<Mutex<Ledger>>,), Error = Infallible> + Clone {
    warp::any().map(move || ledger.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FlatIndex;
    use crate::providers::{ExtractiveGenerator, HashEmbedder};
    use crate::snapshot::SnapshotStore;
    use crate::store::RecordStore;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn tx(merchant: &str, category: &str, description: &str) -> Transaction {
        Transaction {
            id: format!("{}-{}", merchant, description),
            amount: 12.0,
            description: description.into(),
            merchant: merchant.into(),
            category: category.into(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            location: None,
        }
    }

    fn service(dir: &TempDir) -> (Arc<RagEngine>, Arc<Mutex<Ledger>>) {
        let engine = Arc::new(RagEngine::new(
            Box::new(FlatIndex::new(16)),
            RecordStore::new(),
            Arc::new(HashEmbedder::new(16)),
            Arc::new(ExtractiveGenerator::new()),
            SnapshotStore::new(dir.path().join("vectors.idx")),
        ));
        let ledger = Arc::new(Mutex::new(Ledger::new(
            dir.path().join("transactions.json"),
        )));
        (engine, ledger)
    }

    #[tokio::test]
    async fn ingest_then_query_round_trip() {
        let dir = TempDir::new().unwrap();
        let (engine, ledger) = service(&dir);
        let api = routes(engine, ledger.clone()).recover(handle_rejection);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/transactions")
            .json(&vec![
                tx("Cafe", "food", "espresso"),
                tx("Shell", "gas", "fuel"),
            ])
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["ingested"], 2);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/query")
            .json(&serde_json::json!({ "query": "coffee spend?" }))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert!(!body["answer"].as_str().unwrap().is_empty());
        assert_eq!(body["matches"].as_array().unwrap().len(), 2);

        // the raw mirror received the same batch
        let mirrored = ledger.lock().unwrap().load().unwrap();
        assert_eq!(mirrored.len(), 2);
    }

    #[tokio::test]
    async fn zero_k_is_a_bad_request() {
        let dir = TempDir::new().unwrap();
        let (engine, ledger) = service(&dir);
        let api = routes(engine, ledger).recover(handle_rejection);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/query")
            .json(&serde_json::json!({ "query": "anything", "k": 0 }))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("k must be at least 1"));
    }

    #[tokio::test]
    async fn blank_question_is_a_bad_request() {
        let dir = TempDir::new().unwrap();
        let (engine, ledger) = service(&dir);
        let api = routes(engine, ledger).recover(handle_rejection);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/query")
            .json(&serde_json::json!({ "query": "   " }))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn malformed_body_is_a_bad_request() {
        let dir = TempDir::new().unwrap();
        let (engine, ledger) = service(&dir);
        let api = routes(engine, ledger).recover(handle_rejection);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/query")
            .body("definitely not json")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn list_applies_ledger_filters() {
        let dir = TempDir::new().unwrap();
        let (engine, ledger) = service(&dir);
        let api = routes(engine, ledger).recover(handle_rejection);

        warp::test::request()
            .method("POST")
            .path("/api/transactions")
            .json(&vec![
                tx("Cafe", "food", "espresso"),
                tx("Shell", "gas", "fuel"),
            ])
            .reply(&api)
            .await;

        let resp = warp::test::request()
            .method("GET")
            .path("/api/transactions?category=food")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["merchant"], "Cafe");
    }

    #[tokio::test]
    async fn stats_reports_counts_and_providers() {
        let dir = TempDir::new().unwrap();
        let (engine, ledger) = service(&dir);
        let api = routes(engine, ledger).recover(handle_rejection);

        warp::test::request()
            .method("POST")
            .path("/api/transactions")
            .json(&vec![tx("Cafe", "food", "espresso")])
            .reply(&api)
            .await;

        let resp = warp::test::request()
            .method("GET")
            .path("/api/stats")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["records"], 1);
        assert_eq!(body["dimension"], 16);
        assert_eq!(body["embedder"], "hash");
        assert_eq!(body["generator"], "extractive");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (engine, ledger) = service(&dir);
        let api = routes(engine, ledger).recover(handle_rejection);

        let resp = warp::test::request()
            .method("GET")
            .path("/nope")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 404);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert!(body["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn wrong_method_on_a_known_route_is_not_allowed() {
        let dir = TempDir::new().unwrap();
        let (engine, ledger) = service(&dir);
        let api = routes(engine, ledger).recover(handle_rejection);

        let resp = warp::test::request()
            .method("GET")
            .path("/api/query")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 405);
    }
}
