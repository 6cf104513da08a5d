//! chatagent - interactive REPL over a chat session

use chatagent::config::AgentConfig;
use chatagent::data::{display_value, DataContext, SqliteDataSource};
use chatagent::llm::{ChatClient, GeminiService, LlmService, LoggingService};
use chatagent::processors::{OutputBlock, PlantUmlRenderer, ProcessorRegistry};
use chatagent::runtime::{spawn_session, SessionEvent, SessionHandle};
use chatagent::session::ChatSession;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout belongs to the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatagent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AgentConfig::from_env()?;
    let api_key = config
        .api_key
        .clone()
        .ok_or("GEMINI_API_KEY must be set")?;

    let gemini = GeminiService::new(api_key, &config.model, Some(&config.base_url), config.timeout)?;
    let service: Arc<dyn LlmService> = Arc::new(LoggingService::new(Arc::new(gemini)));
    let client = ChatClient::new(service, config.temperature);

    let diagram_dir = std::env::temp_dir().join("chatagent-diagrams");
    std::fs::create_dir_all(&diagram_dir)?;
    let renderer = PlantUmlRenderer::new(config.plantuml_bin.clone(), diagram_dir);
    let registry = Arc::new(ProcessorRegistry::standard(Arc::new(renderer)));
    tracing::info!(kinds = ?registry.kinds().collect::<Vec<_>>(), model = %config.model, "Starting chatagent");

    let session = ChatSession::new(client, registry, config.template.clone())
        .with_agent_name(config.agent_name.clone());
    let handle = spawn_session(session);
    let printer = tokio::spawn(print_events(handle.subscribe()));

    if let Some(path) = std::env::args().nth(1) {
        bind(&handle, &config, &path).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if line == "/reset" {
            handle.reset().await?;
            println!("Conversation cleared.");
            continue;
        }
        if let Some(path) = line.strip_prefix("/context ") {
            bind(&handle, &config, path.trim()).await;
            continue;
        }

        match handle.submit(line) {
            Ok(turn) => {
                turn.wait().await?;
            }
            Err(e) => eprintln!("{e}"),
        }
    }

    handle.shutdown().await;
    // The printer ends once every event sender is gone
    let _ = printer.await;
    Ok(())
}

async fn bind(handle: &SessionHandle, config: &AgentConfig, path: &str) {
    let source = match SqliteDataSource::open_existing(Path::new(path)) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Cannot open {path}: {e}");
            return;
        }
    };
    let mut data = DataContext::new(path, Arc::new(source));
    if let Some(bounds) = &config.view_bounds {
        data = data.with_bounds(bounds.clone());
    }
    match handle.bind_data_context(Some(data)).await {
        Ok(true) => println!("Opened {path}."),
        Ok(false) => println!("{path} is already open."),
        Err(e) => eprintln!("{e}"),
    }
}

async fn print_events(mut rx: broadcast::Receiver<SessionEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => print_event(&event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Message { sender, text } if sender != chatagent::runtime::USER_SENDER => {
            println!("[{sender}]: {text}");
        }
        SessionEvent::Output { sender, block } => print_block(sender, block),
        SessionEvent::Error { message } => println!("[error]: {message}"),
        SessionEvent::ContextChanged { context_id: None } => println!("Data context closed."),
        _ => {}
    }
}

fn print_block(sender: &str, block: &OutputBlock) {
    match block {
        OutputBlock::Text { text } => println!("[{sender}]: {text}"),
        OutputBlock::Table {
            title,
            columns,
            rows,
            ..
        } => {
            println!("[{sender}]: {title}");
            print!("{}", format_table(columns, rows));
        }
        OutputBlock::Chart(chart) => {
            println!("[{sender}]: {} (chart)", chart.title);
            for series in &chart.series {
                let points: Vec<String> = chart
                    .categories
                    .iter()
                    .zip(&series.values)
                    .map(|(category, value)| match value {
                        Some(v) => format!("{category}={v}"),
                        None => format!("{category}=-"),
                    })
                    .collect();
                println!("  {}: {}", series.name, points.join(", "));
            }
        }
        OutputBlock::Diagram { title, image_path } => {
            println!("[{sender}]: {title}: {}", image_path.display());
        }
    }
}

/// Render rows as left-aligned columns separated by two spaces
fn format_table(columns: &[String], rows: &[Vec<Value>]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(display_value).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let mut out = render_line(columns, &widths);
    for row in &cells {
        out.push_str(&render_line(row, &widths));
    }
    out
}

fn render_line(values: &[String], widths: &[usize]) -> String {
    let line: Vec<String> = values
        .iter()
        .zip(widths)
        .map(|(value, &width)| format!("{value:<width$}"))
        .collect();
    format!("{}\n", line.join("  ").trim_end())
}
