use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{Note, NoteSource, Owner};
use crate::error::{QuillError, Result};
use crate::queue::MutationQueue;
use crate::store::{CacheStore, DurableStore, NoteStore, RetryStore};
use crate::sync::{Direction, SyncConfig, SyncEngine, TransferOutcome};

const QUILL_DIR: &str = ".quill";
const CLIENT_FILE: &str = "client.json";

/// Client-side identity: the opaque device id is generated once at init; the
/// user id is whatever the auth collaborator handed `quill login`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientConfig {
    device_id: String,
    #[serde(default)]
    user_id: Option<String>,
}

/// Find the notebook root by looking for .quill/ or .git/
fn find_notebook_root() -> PathBuf {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let mut current = cwd.as_path();
    loop {
        if current.join(QUILL_DIR).exists() || current.join(".git").exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return cwd,
        }
    }
}

fn load_client(quill_dir: &Path) -> Result<ClientConfig> {
    let path = quill_dir.join(CLIENT_FILE);
    if !path.exists() {
        return Err(QuillError::NotInitialized);
    }
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn save_client(quill_dir: &Path, client: &ClientConfig) -> Result<()> {
    let path = quill_dir.join(CLIENT_FILE);
    fs::write(path, serde_json::to_string_pretty(client)?)?;
    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

fn open_engine() -> Result<SyncEngine> {
    let root = find_notebook_root();
    let dir = root.join(QUILL_DIR);
    if !dir.exists() {
        return Err(QuillError::NotInitialized);
    }

    let client = load_client(&dir)?;
    let owner = Owner {
        device_id: client.device_id,
        user_id: client.user_id,
    };

    let cache: Arc<dyn NoteStore> = Arc::new(RetryStore::new(CacheStore::open(&dir)?));
    let durable: Arc<dyn NoteStore> = Arc::new(RetryStore::new(DurableStore::open(&dir)?));
    let queue = Arc::new(MutationQueue::open(&dir)?);

    Ok(SyncEngine::new(
        owner,
        cache,
        durable,
        queue,
        SyncConfig::default(),
    ))
}

/// Resolve a display position ("2") or UUID prefix ("a1b2c") to a note.
fn resolve_note(notes: &[Note], selector: &str) -> Result<Note> {
    if let Ok(position) = selector.parse::<usize>() {
        if position >= 1 && position <= notes.len() {
            return Ok(notes[position - 1].clone());
        }
        return Err(QuillError::NotFound(selector.to_string()));
    }

    let prefix = selector.to_lowercase();
    let matches: Vec<&Note> = notes
        .iter()
        .filter(|n| n.id.to_string().starts_with(&prefix))
        .collect();
    match matches.len() {
        1 => Ok(matches[0].clone()),
        0 => Err(QuillError::NotFound(selector.to_string())),
        _ => Err(QuillError::Validation(format!(
            "'{}' matches more than one note",
            selector
        ))),
    }
}

fn short_id(note: &Note) -> String {
    note.id.to_string()[..7].to_string()
}

fn print_note_line(position: usize, note: &Note) {
    let mut flags = String::new();
    if note.pinned {
        flags.push('*');
    }
    if note.is_private {
        flags.push('~');
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" {}", flags)
    };
    println!(
        "{:>3}.{} {} ({}) [{}]",
        position,
        flags,
        note.title,
        short_id(note),
        note.source
    );
}

fn read_stdin() -> Result<String> {
    let mut content = String::new();
    io::stdin().read_to_string(&mut content)?;
    Ok(content)
}

pub fn handle_init() -> Result<()> {
    let root = env::current_dir()?;
    let dir = root.join(QUILL_DIR);

    if dir.exists() {
        return Err(QuillError::AlreadyInitialized);
    }
    fs::create_dir_all(&dir)?;

    let client = ClientConfig {
        device_id: Uuid::new_v4().to_string(),
        user_id: None,
    };
    save_client(&dir, &client)?;

    // Open both stores once so the schemas exist, then seed the first note.
    let engine = open_engine()?;
    runtime()?.block_on(async { engine.load().await })?;

    println!("Initialized quill notebook in {}", root.display());
    Ok(())
}

pub fn handle_login(user_id: String) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(QuillError::Validation("user id cannot be empty".to_string()));
    }
    let dir = find_notebook_root().join(QUILL_DIR);
    let mut client = load_client(&dir)?;
    client.user_id = Some(user_id.clone());
    save_client(&dir, &client)?;

    println!("Signed in as {}", user_id);
    println!("New notes now go to the durable store. Existing notes stay put; use 'quill transfer'.");
    Ok(())
}

pub fn handle_logout() -> Result<()> {
    let dir = find_notebook_root().join(QUILL_DIR);
    let mut client = load_client(&dir)?;
    client.user_id = None;
    save_client(&dir, &client)?;

    println!("Signed out");
    Ok(())
}

pub fn handle_add(title: String, stdin: bool, json: bool) -> Result<()> {
    let engine = open_engine()?;
    let note = runtime()?.block_on(async {
        engine.load().await?;
        let content = if stdin { read_stdin()? } else { String::new() };
        engine.create_note(&title, &content).await
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&note)?);
    } else {
        println!(
            "Created note ({}) - {} [{}]",
            short_id(&note),
            note.title,
            note.source
        );
    }
    Ok(())
}

pub fn handle_list(json: bool) -> Result<()> {
    let engine = open_engine()?;
    let (notes, queued) = runtime()?.block_on(async {
        engine.load().await?;
        let queued = engine.queue().len().await?;
        Ok::<_, QuillError>((engine.notes().await, queued))
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&notes)?);
        return Ok(());
    }

    for (index, note) in notes.iter().enumerate() {
        print_note_line(index + 1, note);
    }
    if queued > 0 {
        println!("({} queued offline mutations; run 'quill sync')", queued);
    }
    Ok(())
}

pub fn handle_get(id: String, json: bool) -> Result<()> {
    let engine = open_engine()?;
    let note = runtime()?.block_on(async {
        engine.load().await?;
        let notes = engine.notes().await;
        resolve_note(&notes, &id)
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&note)?);
        return Ok(());
    }

    println!("{} ({}) [{}]", note.title, short_id(&note), note.source);
    println!(
        "pinned: {}  private: {}  collapsed: {}  order: {}",
        note.pinned, note.is_private, note.is_collapsed, note.order
    );
    if let Some(goal) = note.goal {
        println!("goal: {} {}", goal, note.goal_type.as_str());
    }
    if !note.content.is_empty() {
        println!();
        println!("{}", note.content);
    }
    Ok(())
}

pub fn handle_edit(id: String, title: Option<String>, stdin: bool) -> Result<()> {
    if title.is_none() && !stdin {
        return Err(QuillError::Validation(
            "nothing to change: pass --title and/or --stdin".to_string(),
        ));
    }

    let engine = open_engine()?;
    runtime()?.block_on(async {
        engine.load().await?;
        let notes = engine.notes().await;
        let note = resolve_note(&notes, &id)?;

        if let Some(title) = title {
            engine.update_title(note.id, &title).await?;
        }
        if stdin {
            let content = read_stdin()?;
            engine.update_content(note.id, &content).await?;
        }
        Ok::<_, QuillError>(())
    })?;

    println!("Updated note");
    Ok(())
}

pub fn handle_pin(id: String, remove: bool) -> Result<()> {
    let engine = open_engine()?;
    let note = runtime()?.block_on(async {
        engine.load().await?;
        let notes = engine.notes().await;
        let note = resolve_note(&notes, &id)?;
        engine.update_pin(note.id, !remove).await?;
        Ok::<_, QuillError>(note)
    })?;

    println!(
        "{} {}",
        if remove { "Unpinned" } else { "Pinned" },
        note.title
    );
    Ok(())
}

pub fn handle_private(id: String, remove: bool) -> Result<()> {
    let engine = open_engine()?;
    runtime()?.block_on(async {
        engine.load().await?;
        let notes = engine.notes().await;
        let note = resolve_note(&notes, &id)?;
        engine.update_privacy(note.id, !remove).await?;
        engine.flush_pending().await;
        Ok::<_, QuillError>(())
    })?;

    println!("{}", if remove { "Visible" } else { "Private" });
    Ok(())
}

pub fn handle_collapse(id: String, remove: bool) -> Result<()> {
    let engine = open_engine()?;
    runtime()?.block_on(async {
        engine.load().await?;
        let notes = engine.notes().await;
        let note = resolve_note(&notes, &id)?;
        engine.update_collapsed(note.id, !remove).await?;
        engine.flush_pending().await;
        Ok::<_, QuillError>(())
    })?;

    println!("{}", if remove { "Expanded" } else { "Collapsed" });
    Ok(())
}

pub fn handle_reorder(id: String, direction: String) -> Result<()> {
    let direction: Direction = direction.parse()?;
    let engine = open_engine()?;
    runtime()?.block_on(async {
        engine.load().await?;
        let notes = engine.notes().await;
        let note = resolve_note(&notes, &id)?;
        engine.reorder(note.id, direction).await
    })?;

    println!("Reordered");
    Ok(())
}

pub fn handle_delete(id: String) -> Result<()> {
    let engine = open_engine()?;
    let note = runtime()?.block_on(async {
        engine.load().await?;
        let notes = engine.notes().await;
        let note = resolve_note(&notes, &id)?;
        engine.delete_note(note.id).await?;
        Ok::<_, QuillError>(note)
    })?;

    println!("Deleted {}", note.title);
    Ok(())
}

pub fn handle_transfer(id: String, target: String) -> Result<()> {
    let target: NoteSource = target.parse()?;
    let engine = open_engine()?;
    let (note, outcome) = runtime()?.block_on(async {
        engine.load().await?;
        let notes = engine.notes().await;
        let note = resolve_note(&notes, &id)?;
        let outcome = engine.transfer(note.id, target).await?;
        Ok::<_, QuillError>((note, outcome))
    })?;

    match outcome {
        TransferOutcome::Complete => {
            println!("Moved {} to the {} store", note.title, target)
        }
        TransferOutcome::SourceDeleteFailed => println!(
            "Copied {} to the {} store, but the original is still in {} - run 'quill sync'",
            note.title, target, note.source
        ),
    }
    Ok(())
}

pub fn handle_sync() -> Result<()> {
    let engine = open_engine()?;
    let report = runtime()?.block_on(async {
        engine.load().await?;
        engine.sync_queue().await
    })?;

    println!(
        "Replayed {} queued mutations, {} remaining",
        report.replayed, report.remaining
    );
    Ok(())
}

pub fn handle_queue(json: bool) -> Result<()> {
    let engine = open_engine()?;
    let entries = runtime()?.block_on(async { engine.queue().entries().await })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }
    for entry in &entries {
        println!(
            "{} {} ({})",
            entry.kind,
            &entry.note_id.to_string()[..7],
            entry.queued_at
        );
    }
    Ok(())
}
