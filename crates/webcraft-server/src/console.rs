//! Operator console commands read from stdin.

use tracing::warn;

use crate::world::ServerWorld;

pub enum ConsoleOutcome {
    Reply(String),
    Stop,
}

pub fn handle_command(world: &mut ServerWorld, line: &str) -> ConsoleOutcome {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return ConsoleOutcome::Reply(String::new());
    };
    let arg = parts.next();
    let reply = match (cmd, arg) {
        ("op", Some(name)) => {
            if world.admins_mut().add(name) {
                world.admins_mut().save();
                format!("{name} is now an admin")
            } else {
                format!("{name} is already an admin")
            }
        }
        ("deop", Some(name)) => {
            if world.admins_mut().remove(name) {
                world.admins_mut().save();
                format!("{name} is no longer an admin")
            } else {
                format!("{name} is not an admin")
            }
        }
        ("admins", None) => format!("{} admins", world.admins_mut().len()),
        ("list", None) => {
            let mut names = world.player_names();
            names.sort();
            format!("{} players online: {}", names.len(), names.join(", "))
        }
        ("save", None) => match world.save() {
            Ok(()) => "World saved".to_string(),
            Err(e) => {
                warn!("Save failed: {e}");
                format!("Save failed: {e}")
            }
        },
        ("stop", None) => return ConsoleOutcome::Stop,
        _ => "Commands: op <name>, deop <name>, admins, list, save, stop".to_string(),
    };
    ConsoleOutcome::Reply(reply)
}
