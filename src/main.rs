use clap::Parser;
use quill::cli::{
    handle_add, handle_collapse, handle_delete, handle_edit, handle_get, handle_init, handle_list,
    handle_login, handle_logout, handle_pin, handle_private, handle_queue, handle_reorder,
    handle_sync, handle_transfer, Cli, Commands,
};

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => handle_init(),
        Commands::Login { user_id } => handle_login(user_id),
        Commands::Logout => handle_logout(),
        Commands::Add { title, stdin, json } => handle_add(title, stdin, json),
        Commands::List { json } => handle_list(json),
        Commands::Get { id, json } => handle_get(id, json),
        Commands::Edit { id, title, stdin } => handle_edit(id, title, stdin),
        Commands::Pin { id, remove } => handle_pin(id, remove),
        Commands::Private { id, remove } => handle_private(id, remove),
        Commands::Collapse { id, remove } => handle_collapse(id, remove),
        Commands::Reorder { id, direction } => handle_reorder(id, direction),
        Commands::Delete { id } => handle_delete(id),
        Commands::Transfer { id, target } => handle_transfer(id, target),
        Commands::Sync => handle_sync(),
        Commands::Queue { json } => handle_queue(json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
