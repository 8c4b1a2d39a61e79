//! Terminal output for read-only queries
//!
//! Deliberately thin: explain/insights rendering proper lives outside the
//! core; this prints just enough to act on.

use waymark_core::SessionInsight;
use waymark_foundation::{RewindPoint, SessionRecord};

pub fn print_points(points: &[RewindPoint]) {
    if points.is_empty() {
        println!("No rewind points.");
        return;
    }
    for point in points {
        let marker = if point.is_logs_only { "logs-only" } else { "ok" };
        println!(
            "{}  {}  [{}]  session {}",
            point.date.format("%Y-%m-%d %H:%M:%S"),
            point.checkpoint_id,
            marker,
            point.session_id
        );
    }
}

pub fn print_sessions(sessions: &[SessionRecord]) {
    if sessions.is_empty() {
        println!("No sessions recorded.");
        return;
    }
    for session in sessions {
        let description = if session.description.is_empty() {
            "(no description)"
        } else {
            &session.description
        };
        println!(
            "{}  {} checkpoint(s)  {}",
            session.id,
            session.checkpoints.len(),
            description
        );
    }
}

pub fn print_insights(insights: &[SessionInsight]) {
    if insights.is_empty() {
        println!("No insights yet.");
        return;
    }
    for insight in insights {
        println!(
            "{}  {} checkpoint(s), {} file(s), {} tokens  {}",
            insight.session_id,
            insight.checkpoint_count,
            insight.files_touched,
            insight.token_usage.total(),
            insight.description
        );
    }
}
