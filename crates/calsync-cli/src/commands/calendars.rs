//! Calendar listing.

use super::Context;
use crate::error::CliResult;

/// List the calendars `source_id` can see.
///
/// Selected calendars are marked with `*`, writable ones with `rw`.
pub async fn list(ctx: &Context, source_id: &str) -> CliResult<()> {
    let (source, provider) = ctx.provider(source_id)?;
    let calendars = provider.list_calendars().await?;

    if calendars.is_empty() {
        println!("{} has no calendars.", source.display_name());
        return Ok(());
    }

    for calendar in calendars {
        let selected = if source.selected_calendars.contains(&calendar.id) {
            "*"
        } else {
            " "
        };
        let access = if calendar.writable { "rw" } else { "ro" };
        let primary = if calendar.is_primary { " (primary)" } else { "" };
        println!("{} {} {}{}", selected, access, calendar.name, primary);
        println!("       {}", calendar.id);
    }
    Ok(())
}
