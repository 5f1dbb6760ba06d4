use anyhow::Result;
use serde::Serialize;

use soundbase::config::SoundbaseConfig;
use soundbase::repo::stats::StatsRepository;
use soundbase::repo::types::{RankedSound, RankedUser};

use super::{format_duration, open_store, print_json};

#[derive(Serialize)]
struct Leaderboard<T> {
    days: u32,
    total: u64,
    rows: Vec<T>,
}

fn window_label(days: u32) -> String {
    if days == 0 {
        "all time".to_string()
    } else {
        format!("last {days} day(s)")
    }
}

/// Display the summary report in the terminal.
pub fn stats(config: &SoundbaseConfig, days: Option<u32>, json: bool) -> Result<()> {
    let days = days.unwrap_or(config.stats.default_days);
    let repo = StatsRepository::new(open_store(config)?);
    let summary = repo.get_summary_stats(days);

    if json {
        return print_json(&summary);
    }

    println!("Soundbase Statistics ({})", window_label(days));
    println!("{}", "=".repeat(40));
    println!("  Sounds:              {}", summary.total_sounds);
    println!("  Plays:               {}", summary.total_plays);
    println!("  Active users:        {}", summary.active_users);
    println!("  Active voice users:  {}", summary.active_voice_users);
    println!("  Voice hours:         {:.2}", summary.total_voice_hours);

    let timeline = repo.get_activity_timeline(days);
    if !timeline.is_empty() {
        println!();
        println!("Daily activity:");
        for point in &timeline {
            println!("  {}  {}", point.date, point.count);
        }
    }

    Ok(())
}

pub fn top_users(config: &SoundbaseConfig, days: Option<u32>, limit: Option<usize>, json: bool) -> Result<()> {
    let days = days.unwrap_or(config.stats.default_days);
    let limit = limit.unwrap_or(config.stats.leaderboard_size);
    let (rows, total) = StatsRepository::new(open_store(config)?).top_users(days, limit);

    if json {
        return print_json(&Leaderboard { days, total, rows });
    }

    println!("Top users by plays ({}, {total} plays total)", window_label(days));
    print_ranked(rows.iter().map(|r: &RankedUser| (r.username.as_str(), r.count)));
    Ok(())
}

pub fn top_sounds(config: &SoundbaseConfig, days: Option<u32>, limit: Option<usize>, json: bool) -> Result<()> {
    let days = days.unwrap_or(config.stats.default_days);
    let limit = limit.unwrap_or(config.stats.leaderboard_size);
    let (rows, total) = StatsRepository::new(open_store(config)?).top_sounds(days, limit);

    if json {
        return print_json(&Leaderboard { days, total, rows });
    }

    println!("Top sounds by plays ({}, {total} plays total)", window_label(days));
    print_ranked(rows.iter().map(|r: &RankedSound| (r.filename.as_str(), r.count)));
    Ok(())
}

pub fn voice_top(
    config: &SoundbaseConfig,
    days: Option<u32>,
    limit: Option<usize>,
    channels: bool,
    json: bool,
) -> Result<()> {
    let days = days.unwrap_or(config.stats.default_days);
    let limit = limit.unwrap_or(config.stats.leaderboard_size);
    let repo = StatsRepository::new(open_store(config)?);
    let rows = if channels {
        repo.top_voice_channels(days, limit)
    } else {
        repo.top_voice_users(days, limit)
    };

    if json {
        return print_json(&rows);
    }

    let what = if channels { "channels" } else { "users" };
    println!("Top {what} by voice time ({})", window_label(days));
    if rows.is_empty() {
        println!("  (no voice activity)");
    }
    for (i, row) in rows.iter().enumerate() {
        println!(
            "  {:>2}. {:<24} {:>10}  ({} session(s))",
            i + 1,
            row.key,
            format_duration(row.total_seconds),
            row.session_count
        );
    }
    Ok(())
}

/// Print one user's year in review.
pub fn year(config: &SoundbaseConfig, username: &str, year: i32, json: bool) -> Result<()> {
    let digest = StatsRepository::new(open_store(config)?).get_user_year_stats(username, year);

    if json {
        return print_json(&digest);
    }

    println!("{} in {}", digest.username, digest.year);
    println!("{}", "=".repeat(40));
    println!("  Plays:               {}", digest.total_plays);
    println!("  Favorites added:     {}", digest.favorites_added);
    println!("  Voice joins:         {}", digest.voice_joins);
    println!("  Voice hours:         {:.2}", digest.total_voice_hours);
    println!("  Longest session:     {} min", digest.longest_session_minutes);
    if let Some(day) = &digest.most_active_day {
        println!("  Most active day:     {} ({} actions)", day.tag, day.count);
    }

    if !digest.top_sounds.is_empty() {
        println!();
        println!("Top sounds:");
        print_ranked(digest.top_sounds.iter().map(|r| (r.filename.as_str(), r.count)));
    }
    if !digest.top_actions.is_empty() {
        println!();
        println!("Top actions:");
        print_ranked(digest.top_actions.iter().map(|t| (t.tag.as_str(), t.count)));
    }
    Ok(())
}

pub fn on_this_day(config: &SoundbaseConfig, months: u32, limit: Option<usize>, json: bool) -> Result<()> {
    let limit = limit.unwrap_or(config.stats.leaderboard_size);
    let rows = StatsRepository::new(open_store(config)?).sounds_on_this_day(months, limit);

    if json {
        return print_json(&rows);
    }

    println!("Played around this day {months} month(s) ago");
    print_ranked(rows.iter().map(|r| (r.filename.as_str(), r.count)));
    Ok(())
}

fn print_ranked<'a>(rows: impl Iterator<Item = (&'a str, u64)>) {
    let mut any = false;
    for (i, (name, count)) in rows.enumerate() {
        any = true;
        println!("  {:>2}. {:<32} {}", i + 1, name, count);
    }
    if !any {
        println!("  (nothing recorded)");
    }
}
