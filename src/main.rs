use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use solution_review::store::open_store;
use solution_review::{
    config, init_telemetry, CreationGuard, DocumentDetails, DocumentId, DocumentState,
    DocumentStore, LifecycleError, LifecycleOrchestrator, NewReview, StateGraph,
    TransitionRequest,
};

#[derive(Parser)]
#[command(name = "solution-review")]
#[command(about = "Track architecture Solution Reviews through their approval lifecycle")]
#[command(long_about = "Solution reviews move Draft -> Submitted -> Approved -> Active -> Outdated. \
                       Each system code may have at most one review outside Outdated at a time.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new Draft review for a system
    Create {
        #[arg(long, help = "System code the review belongs to")]
        system: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        summary: Option<String>,
        #[arg(long, help = "Acting user")]
        user: String,
    },
    /// Start the next version of a system's Active review
    NewVersion {
        #[arg(long)]
        system: String,
        #[arg(long)]
        user: String,
    },
    /// Apply a lifecycle operation (submit, remove_submission, approve, unapprove, activate, mark_outdated)
    Transition {
        #[arg(long)]
        id: String,
        #[arg(long, help = "Operation name, case-insensitive")]
        operation: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Show one review
    Show {
        #[arg(long)]
        id: String,
    },
    /// List every version of a system's reviews
    List {
        #[arg(long)]
        system: String,
    },
    /// List the operations a review currently allows
    Operations {
        #[arg(long)]
        id: String,
    },
    /// Edit the title or summary of a Draft
    Edit {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        summary: Option<String>,
        #[arg(long)]
        user: String,
    },
    /// Delete a Draft
    Delete {
        #[arg(long)]
        id: String,
        #[arg(long)]
        user: String,
    },
}

#[derive(Serialize)]
struct OperationsView {
    state: DocumentState,
    editable: bool,
    finalized: bool,
    operations: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config()?;
    init_telemetry(&config.observability)?;

    let outcome = tokio::runtime::Runtime::new()?.block_on(async {
        let store = open_store(config).await?;
        run(cli.command, store).await
    });

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(RunError::Lifecycle(e)) => {
            let body = json!({ "error": e.kind(), "message": e.to_string() });
            eprintln!("{}", serde_json::to_string_pretty(&body)?);
            std::process::exit(2);
        }
        Err(RunError::Other(e)) => Err(e),
    }
}

enum RunError {
    Lifecycle(LifecycleError),
    Other(anyhow::Error),
}

impl From<LifecycleError> for RunError {
    fn from(err: LifecycleError) -> Self {
        RunError::Lifecycle(err)
    }
}

impl From<solution_review::StoreError> for RunError {
    fn from(err: solution_review::StoreError) -> Self {
        RunError::Lifecycle(err.into())
    }
}

impl From<serde_json::Error> for RunError {
    fn from(err: serde_json::Error) -> Self {
        RunError::Other(err.into())
    }
}

async fn run(command: Commands, store: Arc<dyn DocumentStore>) -> Result<serde_json::Value, RunError> {
    let orchestrator = LifecycleOrchestrator::new(Arc::clone(&store));
    let creation = CreationGuard::new(store);

    let value = match command {
        Commands::Create {
            system,
            title,
            summary,
            user,
        } => {
            let doc = creation
                .create(NewReview {
                    system_code: system,
                    details: DocumentDetails { title, summary },
                    created_by: user,
                })
                .await?;
            serde_json::to_value(doc)?
        }
        Commands::NewVersion { system, user } => {
            serde_json::to_value(creation.create_from_existing(&system, &user).await?)?
        }
        Commands::Transition {
            id,
            operation,
            user,
            comment,
        } => {
            let request = TransitionRequest {
                document_id: id,
                operation,
                acting_user: user,
                comment,
            };
            serde_json::to_value(orchestrator.execute_request(&request).await?)?
        }
        Commands::Show { id } => serde_json::to_value(orchestrator.get(&DocumentId::from(id)).await?)?,
        Commands::List { system } => serde_json::to_value(orchestrator.history(&system).await?)?,
        Commands::Operations { id } => {
            let doc = orchestrator.get(&DocumentId::from(id)).await?;
            let state = doc.state();
            serde_json::to_value(OperationsView {
                state,
                editable: StateGraph::is_editable(state),
                finalized: StateGraph::is_finalized(state),
                operations: StateGraph::available_operations(state)
                    .into_iter()
                    .map(|op| op.as_str().to_string())
                    .collect(),
            })?
        }
        Commands::Edit {
            id,
            title,
            summary,
            user,
        } => {
            let doc = orchestrator
                .update_details(&DocumentId::from(id), DocumentDetails { title, summary }, &user)
                .await?;
            serde_json::to_value(doc)?
        }
        Commands::Delete { id, user } => {
            let id = DocumentId::from(id);
            orchestrator.delete_draft(&id, &user).await?;
            json!({ "deleted": id })
        }
    };
    Ok(value)
}
