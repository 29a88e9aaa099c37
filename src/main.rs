use std::process::ExitCode;

use escola_console::{
    Console, ConsoleError, EntityId, EntityKind, Route,
    config::{AppConfig, Env},
    confirm::{AutoConfirm, Confirmer, StdinConfirmer},
    form::{EditOutcome, Notice},
    list::DeleteOutcome,
    signup::SignupForm,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "\
uso: escola-console <comando> [argumentos]

  login <cpf> <senha>
  register nome=.. cpf=.. senha=.. data_nascimento=AAAA-MM-DD
  logout [--yes]
  whoami
  dashboard
  list <alunos|professores|escola>
  delete <tipo> <id> [--yes]
  create <tipo> campo=valor...
  edit <tipo> <id> campo=valor... [--yes]";

/// main
///
/// Entry point: loads configuration, installs logging, restores the persisted
/// session and runs a single command against the backend.
#[tokio::main]
async fn main() -> ExitCode {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging, pretty locally and JSON in production.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "escola_console=info".into());
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
    }

    tracing::debug!(env = ?config.env, base_url = %config.api_base_url, "console starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    let console = Console::from_config(config);
    match run(&console, command, rest).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(text)) => {
            eprintln!("{text}\n\n{USAGE}");
            ExitCode::from(2)
        }
        Err(CliError::Console(e)) => {
            eprintln!("{}", e.notice());
            if let ConsoleError::Validation(errors) = &e {
                for (field, message) in errors.fields() {
                    eprintln!("  {field}: {message}");
                }
            }
            ExitCode::FAILURE
        }
    }
}

enum CliError {
    Usage(String),
    Console(ConsoleError),
}

impl From<ConsoleError> for CliError {
    fn from(e: ConsoleError) -> Self {
        CliError::Console(e)
    }
}

// --- Commands ---

async fn run(console: &Console, command: &str, args: &[String]) -> Result<(), CliError> {
    let assume_yes = args.iter().any(|a| a == "--yes" || a == "-y");
    let args: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|a| *a != "--yes" && *a != "-y")
        .collect();
    let (auto, stdin) = (AutoConfirm(true), StdinConfirmer);
    let confirmer: &dyn Confirmer = if assume_yes { &auto } else { &stdin };

    match (command, args.as_slice()) {
        ("login", [cpf, senha]) => {
            let session = console.login(cpf, senha).await?;
            println!("Bem-vindo, {}!", session.display_name.as_deref().unwrap_or("usuário"));
        }
        ("register", pairs) => {
            let mut form = SignupForm::default();
            for (name, value) in parse_pairs(pairs)? {
                match name {
                    "nome" => form.nome = value.to_string(),
                    "cpf" => form.set_cpf(value),
                    "senha" => form.senha = value.to_string(),
                    "data_nascimento" => form.data_nascimento = value.to_string(),
                    other => return Err(CliError::Usage(format!("campo desconhecido: {other}"))),
                }
            }
            println!("{}", console.register(&form).await?);
        }
        ("logout", []) => {
            if console.gate.logout(confirmer).await {
                println!("Sessão encerrada.");
            }
        }
        ("whoami", []) => match console.route() {
            Route::Login => println!("Nenhuma sessão ativa."),
            Route::Dashboard { role, display_name, visibility } => {
                println!("{} ({role:?})", display_name.as_deref().unwrap_or("-"));
                for entry in visibility.menu {
                    println!("  {}", entry.kind.label());
                }
            }
        },
        ("dashboard", []) => {
            let summary = console.dashboard().await?;
            println!("Bem-vindo, {}!", summary.display_name.as_deref().unwrap_or("usuário"));
            match summary.counts {
                Some(counts) => {
                    for kind in summary.visibility.cards {
                        println!("  {}: {}", kind.label(), counts.get(kind).unwrap_or_default());
                    }
                }
                None => println!("  {}", summary.error.unwrap_or_default()),
            }
        }
        ("list", [kind]) => {
            let list = console.list(parse_kind(kind)?);
            list.load().await?;
            let headers: Vec<&str> = list.columns().iter().map(|c| c.label).collect();
            println!("id\t{}", headers.join("\t"));
            for (entity, row) in list.entities().iter().zip(list.rows()) {
                println!("{}\t{}", entity.id(), row.join("\t"));
            }
            if let Some(error) = list.error() {
                eprintln!("{error}");
            }
        }
        ("delete", [kind, id]) => {
            let list = console.list(parse_kind(kind)?);
            list.load().await?;
            match list.request_delete(&parse_id(id)?, confirmer).await? {
                DeleteOutcome::Deleted => println!("{}", list.notice().unwrap_or_default()),
                DeleteOutcome::Cancelled => println!("Exclusão cancelada."),
            }
        }
        ("create", [kind, pairs @ ..]) => {
            let kind = parse_kind(kind)?;
            console.gate.authorize(kind)?;
            let mut form = console.create_form(kind);
            form.load_options(&console.api).await;
            for (name, value) in parse_pairs(pairs)? {
                if !form.set(name, value) {
                    return Err(CliError::Usage(format!("campo desconhecido: {name}")));
                }
            }
            form.submit(&console.api, &console.gate).await?;
            print_notice(form.state().notice());
        }
        ("edit", [kind, id, pairs @ ..]) => {
            let list = console.list(parse_kind(kind)?);
            list.load().await?;
            let mut form = list.open_edit(&parse_id(id)?)?;
            for (name, value) in parse_pairs(pairs)? {
                if !form.set(name, value) {
                    return Err(CliError::Usage(format!("campo desconhecido: {name}")));
                }
            }
            match list.save_edit(&mut form, confirmer).await? {
                EditOutcome::Saved(_) => print_notice(form.state().notice()),
                EditOutcome::Cancelled => println!("Edição cancelada."),
            }
        }
        (other, _) => return Err(CliError::Usage(format!("comando inválido: {other}"))),
    }
    Ok(())
}

fn print_notice(notice: Option<&Notice>) {
    match notice {
        Some(Notice::Success(text)) => println!("{text}"),
        Some(Notice::Error(text)) => eprintln!("{text}"),
        None => {}
    }
}

fn parse_kind(raw: &str) -> Result<EntityKind, CliError> {
    raw.parse().map_err(CliError::Usage)
}

fn parse_id(raw: &str) -> Result<EntityId, CliError> {
    EntityId::parse(raw).ok_or_else(|| CliError::Usage(format!("id inválido: {raw}")))
}

fn parse_pairs<'a>(pairs: &[&'a str]) -> Result<Vec<(&'a str, &'a str)>, CliError> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .ok_or_else(|| CliError::Usage(format!("esperado campo=valor, recebido {pair}")))
        })
        .collect()
}
