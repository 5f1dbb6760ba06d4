//! CLI `close-sessions` command: recovery after the bot missed leave events.

use anyhow::Result;

use soundbase::config::SoundbaseConfig;
use soundbase::repo::now;
use soundbase::repo::voice::VoiceActivityRepository;

use super::open_store;

/// Close every open voice session at the current time.
pub fn close_sessions(config: &SoundbaseConfig, dry_run: bool) -> Result<()> {
    let repo = VoiceActivityRepository::new(open_store(config)?);
    let open = repo.get_open_sessions();

    if open.is_empty() {
        println!("No open voice sessions.");
        return Ok(());
    }

    println!("{} open session(s):", open.len());
    for session in &open {
        println!(
            "  {} in {} since {}",
            session.username, session.channel_id, session.join_time
        );
    }

    if dry_run {
        println!("\nDry run: nothing changed.");
        return Ok(());
    }

    let closed = repo.close_open_sessions(now());
    println!("\nClosed {closed} session(s).");
    Ok(())
}
