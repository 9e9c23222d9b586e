//! `groundchat ask`: Answer one question grounded in the search index.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use futures::StreamExt;
use groundchat_approach::{AuthClaims, ChatReadRetrieveRead, ChatStreamEvent, Overrides, RetrievalMode};
use groundchat_config::AppConfig;
use groundchat_core::SearchClient;
use groundchat_core::message::Message;
use groundchat_search::{IndexedDocument, InMemoryIndex};

#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question to answer
    pub question: String,

    /// JSON file with earlier turns: `[{"role": "user", "content": "..."}, ...]`
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Stream the answer as it is generated
    #[arg(long)]
    pub stream: bool,

    /// Print the full response (or every stream event) as JSON
    #[arg(long)]
    pub json: bool,

    /// Retrieval mode: text, vectors or hybrid
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<RetrievalMode>,

    /// Number of passages to retrieve
    #[arg(long)]
    pub top: Option<usize>,

    /// Only retrieve passages from this category
    #[arg(long)]
    pub category: Option<String>,

    /// Use semantic re-ranking
    #[arg(long)]
    pub semantic_ranker: bool,

    /// Use semantic captions instead of full passages
    #[arg(long)]
    pub captions: bool,

    /// Ask the model for follow-up questions
    #[arg(long)]
    pub followups: bool,

    /// Answer temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Raw overrides as JSON; flags above take precedence
    #[arg(long)]
    pub overrides_json: Option<String>,

    /// Caller object id, for the owner security filter
    #[arg(long)]
    pub oid: Option<String>,

    /// Caller group id, for the groups security filter (repeatable)
    #[arg(long = "group")]
    pub groups: Vec<String>,

    /// Restrict retrieval to the caller's own documents
    #[arg(long)]
    pub oid_filter: bool,

    /// Restrict retrieval to the caller's groups
    #[arg(long)]
    pub groups_filter: bool,

    /// JSON file of documents to load into the in-memory index
    #[arg(long)]
    pub documents: Option<PathBuf>,
}

fn parse_mode(s: &str) -> Result<RetrievalMode, String> {
    match s.to_ascii_lowercase().as_str() {
        "text" => Ok(RetrievalMode::Text),
        "vectors" => Ok(RetrievalMode::Vectors),
        "hybrid" => Ok(RetrievalMode::Hybrid),
        other => Err(format!("unknown retrieval mode '{other}' (expected text, vectors or hybrid)")),
    }
}

impl AskArgs {
    /// Per-request overrides: `--overrides-json` first, then explicit flags.
    pub fn overrides(&self) -> Result<Overrides, Box<dyn std::error::Error>> {
        let mut overrides: Overrides = match &self.overrides_json {
            Some(json) => serde_json::from_str(json).map_err(|e| format!("Invalid --overrides-json: {e}"))?,
            None => Overrides::default(),
        };

        if let Some(mode) = self.mode {
            overrides.retrieval_mode = mode;
        }
        if let Some(top) = self.top {
            overrides.top = top;
        }
        if let Some(category) = &self.category {
            overrides.selected_category = Some(category.clone());
        }
        if let Some(temperature) = self.temperature {
            overrides.temperature = Some(temperature);
        }
        overrides.semantic_ranker |= self.semantic_ranker;
        overrides.semantic_captions |= self.captions;
        overrides.suggest_followup_questions |= self.followups;
        overrides.use_oid_security_filter |= self.oid_filter;
        overrides.use_groups_security_filter |= self.groups_filter;

        Ok(overrides)
    }

    pub fn claims(&self) -> AuthClaims {
        AuthClaims {
            oid: self.oid.clone(),
            groups: self.groups.clone(),
        }
    }

    /// Earlier turns from `--history`, followed by the question.
    pub fn conversation(&self) -> Result<Vec<Message>, Box<dyn std::error::Error>> {
        let mut messages: Vec<Message> = match &self.history {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read history {}: {e}", path.display()))?;
                serde_json::from_str(&content)
                    .map_err(|e| format!("Failed to parse history {}: {e}", path.display()))?
            }
            None => Vec::new(),
        };
        messages.push(Message::user(&self.question));
        Ok(messages)
    }
}

async fn load_documents(path: &Path) -> Result<Arc<dyn SearchClient>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read documents {}: {e}", path.display()))?;
    let documents: Vec<IndexedDocument> = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse documents {}: {e}", path.display()))?;

    let index = InMemoryIndex::new();
    index.add_all(documents).await;
    tracing::info!(documents = index.count().await, "Loaded in-memory index");
    Ok(Arc::new(index))
}

pub async fn run(args: AskArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    GROUNDCHAT_API_KEY=...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add api_key to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let overrides = args.overrides()?;
    let claims = args.claims();
    let conversation = args.conversation()?;

    let provider = groundchat_providers::build_from_config(&config)?;
    let search = match &args.documents {
        Some(path) => load_documents(path).await?,
        None => groundchat_search::build_from_config(&config.search)?,
    };
    let approach = ChatReadRetrieveRead::from_config(provider, search, &config);

    if args.stream {
        let mut events = approach.run_stream(&conversation, &overrides, &claims).await?;
        let mut stdout = std::io::stdout();

        while let Some(event) = events.next().await {
            let event = event?;
            if args.json {
                println!("{}", serde_json::to_string(&event)?);
                continue;
            }
            match event {
                ChatStreamEvent::ContentDelta { content } => {
                    print!("{content}");
                    stdout.flush()?;
                }
                ChatStreamEvent::Done { followup_questions, .. } => {
                    println!();
                    print_followups(&followup_questions);
                }
                ChatStreamEvent::Context { .. } | ChatStreamEvent::FollowupMetadata { .. } => {}
            }
        }
    } else {
        let response = approach.run(&conversation, &overrides, &claims).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&response)?);
        } else {
            println!("{}", response.message.content);
            print_followups(&response.extra.followup_questions);
        }
    }

    Ok(())
}

fn print_followups(questions: &[String]) {
    if questions.is_empty() {
        return;
    }
    println!();
    println!("  Follow-up questions:");
    for q in questions {
        println!("    - {q}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        ask: AskArgs,
    }

    fn parse(args: &[&str]) -> AskArgs {
        TestCli::parse_from(std::iter::once("groundchat").chain(args.iter().copied())).ask
    }

    #[test]
    fn flags_map_to_overrides() {
        let args = parse(&[
            "What is covered?",
            "--mode",
            "text",
            "--top",
            "5",
            "--category",
            "benefits",
            "--followups",
            "--temperature",
            "0.1",
        ]);
        let overrides = args.overrides().unwrap();
        assert_eq!(overrides.retrieval_mode, RetrievalMode::Text);
        assert_eq!(overrides.top, 5);
        assert_eq!(overrides.selected_category.as_deref(), Some("benefits"));
        assert!(overrides.suggest_followup_questions);
        assert_eq!(overrides.temperature, Some(0.1));
    }

    #[test]
    fn flags_win_over_overrides_json() {
        let args = parse(&[
            "q",
            "--overrides-json",
            r#"{"top": 7, "retrieval_mode": "vectors", "semantic_ranker": true}"#,
            "--top",
            "2",
        ]);
        let overrides = args.overrides().unwrap();
        assert_eq!(overrides.top, 2);
        assert_eq!(overrides.retrieval_mode, RetrievalMode::Vectors);
        assert!(overrides.semantic_ranker);
    }

    #[test]
    fn invalid_overrides_json_is_error() {
        let args = parse(&["q", "--overrides-json", "{not json"]);
        assert!(args.overrides().is_err());
    }

    #[test]
    fn unknown_mode_rejected() {
        let result = TestCli::try_parse_from(["groundchat", "q", "--mode", "fuzzy"]);
        assert!(result.is_err());
    }

    #[test]
    fn claims_from_flags() {
        let args = parse(&["q", "--oid", "abc", "--group", "g1", "--group", "g2", "--groups-filter"]);
        let claims = args.claims();
        assert_eq!(claims.oid.as_deref(), Some("abc"));
        assert_eq!(claims.groups, vec!["g1", "g2"]);
        assert!(args.overrides().unwrap().use_groups_security_filter);
    }

    #[test]
    fn conversation_ends_with_question() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"[{"role":"user","content":"Hi"},{"role":"assistant","content":"Hello!"}]"#,
        )
        .unwrap();

        let history = path.to_string_lossy().to_string();
        let args = parse(&["Next?", "--history", &history]);
        let conversation = args.conversation().unwrap();
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation[2], Message::user("Next?"));
    }
}
