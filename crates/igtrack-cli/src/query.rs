//! Read-only query handlers.

/// Print ingested snapshots, newest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_snapshots(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let snapshots = igtrack_db::list_snapshots(pool, limit.clamp(1, 200)).await?;

    if snapshots.is_empty() {
        println!("no snapshots ingested yet; run `ingest` first");
        return Ok(());
    }

    let header = format!(
        "{:<12}{:<10}{:>9}{:>8}{:>9}  FILE",
        "DATE", "SOURCE", "CREATED", "EVENTS", "UPDATED"
    );
    println!("{header}");
    for snapshot in &snapshots {
        println!(
            "{:<12}{:<10}{:>9}{:>8}{:>9}  {}",
            snapshot.snapshot_date.to_string(),
            snapshot.date_source,
            snapshot.profiles_created,
            snapshot.events_created,
            snapshot.profiles_updated,
            snapshot.source_filename
        );
    }

    Ok(())
}

/// Print one profile's event timeline, oldest first.
///
/// # Errors
///
/// Returns an error if the profile is not found or the database query fails.
pub(crate) async fn run_timeline(pool: &sqlx::PgPool, username: &str) -> anyhow::Result<()> {
    let profile = igtrack_db::get_profile_by_username(pool, username)
        .await?
        .ok_or_else(|| anyhow::anyhow!("profile '{username}' not found"))?;

    let flags = profile.flags();
    println!("Profile: {}", profile.current_username);
    println!(
        "Follower: {}  Following: {}  Pending: {}",
        yes_no(flags.is_active_follower),
        yes_no(flags.is_currently_following),
        yes_no(flags.is_pending_outbound_request)
    );
    println!(
        "First seen: {}",
        profile.first_seen_ts.format("%Y-%m-%d %H:%M UTC")
    );
    println!();

    let events = igtrack_db::list_profile_events(pool, profile.id).await?;
    if events.is_empty() {
        println!("no events recorded");
        return Ok(());
    }

    let header = format!("{:<18}{:<27}REASON", "WHEN (UTC)", "EVENT");
    println!("{header}");
    for event in &events {
        let reason = match (&event.attribution_reason, &event.campaign_name) {
            (Some(reason), Some(campaign)) => format!("{reason} [{campaign}]"),
            (Some(reason), None) => reason.clone(),
            _ => "\u{2014}".to_string(),
        };
        println!(
            "{:<18}{:<27}{}",
            event.event_ts.format("%Y-%m-%d %H:%M").to_string(),
            event.event_type,
            reason
        );
    }

    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
