//! ragrouter HTTP server binary

use ragrouter::server::{run_server, termination_signal, SharedOrchestrator};
use ragrouter::{
    GeminiModel, HttpRetriever, LanguageModel, Orchestrator, Retriever, RouterConfig, ScriptedModel,
    SearchEntry, SearchResults, SerperSearch, StaticRetriever, StaticWebSearch, WebSearch,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    println!("ragrouter - Hybrid Retrieval Router");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = RouterConfig::from_env()?;
    let use_real = std::env::args().any(|arg| arg == "--use-real");
    let resume_from = std::env::args()
        .skip_while(|arg| arg != "--resume")
        .nth(1)
        .map(PathBuf::from);

    let (retriever, web_search, model): (Arc<dyn Retriever>, Arc<dyn WebSearch>, Arc<dyn LanguageModel>) = if use_real {
        println!("✓ Mode: REAL collaborators");
        let (Some(model_key), Some(search_key)) = (config.model_api_key.clone(), config.search_api_key.clone()) else {
            anyhow::bail!("Please set both GEMINI_API_KEY and SERPER_API_KEY");
        };

        let retriever = HttpRetriever::new(config.retriever_url.clone());
        match retriever.health_check().await {
            Ok(true) => println!("✓ Retriever service is healthy: {}", config.retriever_url),
            Ok(false) => eprintln!("⚠️  Retriever service unhealthy: {}", config.retriever_url),
            Err(e) => {
                // retrieval degrades per turn, so keep serving
                eprintln!("⚠️  Failed to reach retriever service {}: {}", config.retriever_url, e);
            }
        }

        let retriever: Arc<dyn Retriever> = Arc::new(retriever);
        let web_search: Arc<dyn WebSearch> =
            Arc::new(SerperSearch::new(config.search_url.clone(), search_key, config.search_results));
        let model: Arc<dyn LanguageModel> =
            Arc::new(GeminiModel::new(config.model_url.clone(), config.model_name.clone(), model_key));
        (retriever, web_search, model)
    } else {
        println!("✓ Mode: MOCK collaborators");
        println!("   (use --use-real to enable HTTP services)");
        mock_collaborators()
    };

    let mut orchestrator = Orchestrator::new(retriever, web_search, model, config.clone());
    if let Some(path) = resume_from {
        orchestrator.resume(&path)?;
    }

    let mut default_context = serde_json::Map::new();
    default_context.insert("location".into(), json!("Miami-Dade County, FL"));
    default_context.insert("service_area".into(), json!("South Florida"));
    default_context.insert(
        "specialties".into(),
        json!(["residential sales", "investment properties", "luxury homes"]),
    );
    default_context.insert("market_focus".into(), json!("Miami real estate"));
    // a resumed session keeps its own values
    orchestrator.seed_context(default_context);

    println!("✓ Session snapshot: {}", orchestrator.snapshot_path().display());
    println!("✓ Starting HTTP server on port {}...", config.port);
    println!();

    let shared: SharedOrchestrator = Arc::new(Mutex::new(orchestrator));
    let served = run_server(shared.clone(), config.port, termination_signal()).await;

    // Snapshot on every exit path
    shared.lock().await.shutdown();
    info!("Session saved, exiting");

    if let Err(ref e) = served {
        error!("Server stopped with error: {:?}", e);
    }
    served
}

/// In-process collaborators for running without external services
fn mock_collaborators() -> (Arc<dyn Retriever>, Arc<dyn WebSearch>, Arc<dyn LanguageModel>) {
    let retriever = StaticRetriever::from_triples(&[
        (
            "HOME BUYING PROCESS\n1. Financial Preparation - Get pre-approved for a mortgage\n2. Finding the Right Property\n3. Making an Offer\n4. Due Diligence Period\n5. Closing Process",
            "general_knowledge.txt",
            0.35,
        ),
        (
            "BRICKELL - \"Manhattan of the South\"\nCharacter: Urban high-rise living, financial district\nMedian Condo Price: $550,000",
            "miami_neighborhoods.txt",
            0.6,
        ),
        (
            "RENTAL PROPERTY INVESTMENT\nShort-Term Rentals: Best Areas: South Beach, Brickell, Aventura\nAverage ROI: 8-12%",
            "investment_guide.txt",
            0.8,
        ),
    ]);
    let search = StaticWebSearch::new(SearchResults {
        organic: vec![SearchEntry {
            title: "Mock market update".to_string(),
            snippet: "Web search is running in mock mode.".to_string(),
            link: None,
        }],
        error: None,
    });
    let model = ScriptedModel::new("(mock model) Context received; enable --use-real for live answers.");

    let retriever: Arc<dyn Retriever> = Arc::new(retriever);
    let web_search: Arc<dyn WebSearch> = Arc::new(search);
    let model: Arc<dyn LanguageModel> = Arc::new(model);
    (retriever, web_search, model)
}
