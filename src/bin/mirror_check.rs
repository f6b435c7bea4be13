use sheaf::config::SyncConfig;
use sheaf::mirror::store::MirrorStore;
use sheaf::sync::SyncError;
use sheaf::sync::api::{HttpNoteApi, NoteApi};

#[tokio::main]
async fn main() {
    systemd_journal_logger::JournalLog::new()
        .unwrap()
        .with_syslog_identifier("sheaf-mirror-check".to_string())
        .install()
        .unwrap();
    log::set_max_level(log::LevelFilter::Info);

    let config = SyncConfig::load();

    println!("=== Mirror vs Server Comparison ===\n");

    let store = match MirrorStore::open(&config.mirror_dir) {
        Ok(s) => s,
        Err(e) => {
            println!("Cannot open mirror {}: {}", config.mirror_dir.display(), e);
            return;
        }
    };

    let ids = match store.ids() {
        Ok(ids) => ids,
        Err(e) => {
            println!("Cannot list mirror {}: {}", config.mirror_dir.display(), e);
            return;
        }
    };

    println!("--- Server: {} ---", config.api_base_url);
    println!("Mirror: {} notes in {}\n", ids.len(), store.dir().display());

    let api = match HttpNoteApi::new(&config.api_base_url) {
        Ok(a) => a,
        Err(e) => {
            println!("Client error: {}", e);
            return;
        }
    };

    let mut in_sync = 0;
    let mut stale = Vec::new();
    let mut gone = Vec::new();
    let mut unreadable = Vec::new();
    let mut unreachable = Vec::new();

    for id in &ids {
        let entry = match store.load(id) {
            Ok(e) => e,
            Err(e) => {
                unreadable.push((id.clone(), e.to_string()));
                continue;
            }
        };

        match api.fetch_note(id).await {
            Ok(server) => {
                if server.date == entry.note.date {
                    in_sync += 1;
                } else {
                    stale.push((
                        entry.note.title.clone(),
                        entry.note.date.clone().unwrap_or_default(),
                        server.date.clone().unwrap_or_default(),
                    ));
                }
            }
            Err(SyncError::NotFound { .. }) => {
                gone.push((id.clone(), entry.note.title.clone()));
            }
            Err(e) => unreachable.push((id.clone(), e.to_string())),
        }
    }

    println!("In sync: {}", in_sync);

    if !stale.is_empty() {
        println!("\nSTALE ({}):", stale.len());
        for (title, mirror_date, server_date) in &stale {
            println!("  {} (mirror: {}, server: {})", title, mirror_date, server_date);
        }
    }

    if !gone.is_empty() {
        println!("\nGONE FROM SERVER ({}):", gone.len());
        for (id, title) in &gone {
            println!("  {} ({})", title, id);
        }
    }

    if !unreadable.is_empty() {
        println!("\nUNREADABLE ({}):", unreadable.len());
        for (id, e) in &unreadable {
            println!("  {}: {}", id, e);
        }
    }

    if !unreachable.is_empty() {
        println!("\nUNREACHABLE ({}):", unreachable.len());
        for (id, e) in &unreachable {
            println!("  {}: {}", id, e);
        }
    }

    if stale.is_empty() && gone.is_empty() && unreadable.is_empty() && unreachable.is_empty() {
        println!("All in sync!");
    }

    println!("\n=== Done ===");
}
