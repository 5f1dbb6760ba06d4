use anyhow::Result;

use soundbase::config::SoundbaseConfig;
use soundbase::repo::sounds::SoundRepository;

use super::{open_store, print_json};

/// Run a fuzzy sound search from the terminal.
pub fn search(
    config: &SoundbaseConfig,
    query: &str,
    limit: Option<usize>,
    guild: Option<i64>,
    json: bool,
) -> Result<()> {
    let store = open_store(config)?;
    let repo = SoundRepository::new(store);
    let limit = limit.unwrap_or(config.search.default_limit);

    let results = match guild {
        Some(guild_id) => repo.search_scoped(query, limit, guild_id),
        None => repo.search(query, limit),
    };

    if json {
        return print_json(&results);
    }

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", results.len());
    for (i, hit) in results.iter().enumerate() {
        let scope = hit
            .sound
            .guild_id
            .map_or_else(|| "global".to_string(), |g| format!("guild {g}"));
        println!(
            "  {}. {} (id: {}, {}, score: {:.1})",
            i + 1,
            hit.sound.filename,
            hit.sound.id,
            scope,
            hit.score
        );
    }

    Ok(())
}
