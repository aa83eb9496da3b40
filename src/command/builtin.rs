//! Built-in command set.

use std::time::Duration;

use super::registry::{Arity, Command, Flow};
use super::{CommandContext, CommandError};
use crate::backend::ValueInfo;

type HandlerResult = Result<Flow, CommandError>;

/// Built-in commands in help order.
pub const BUILTIN_COMMANDS: &[Command] = &[
    Command {
        name: "status",
        aliases: &[],
        usage: "status",
        description: "show node and shell status",
        arity: Arity::Exact(0),
        handler: status,
    },
    Command {
        name: "init",
        aliases: &[],
        usage: "init <host>[:<port>]",
        description: "join an overlay through a contact node",
        arity: Arity::Exact(1),
        handler: init,
    },
    Command {
        name: "get",
        aliases: &[],
        usage: "get <key> [<key> ...]",
        description: "fetch values stored under keys",
        arity: Arity::AtLeast(1),
        handler: get,
    },
    Command {
        name: "put",
        aliases: &[],
        usage: "put <key> <value> [<value> ...]",
        description: "store values under a key",
        arity: Arity::AtLeast(2),
        handler: put,
    },
    Command {
        name: "remove",
        aliases: &[],
        usage: "remove <key> [<value> ...]",
        description: "remove values (all when none given) from a key",
        arity: Arity::AtLeast(1),
        handler: remove,
    },
    Command {
        name: "setttl",
        aliases: &[],
        usage: "setttl <seconds>",
        description: "set time-to-live for later puts",
        arity: Arity::Exact(1),
        handler: set_ttl,
    },
    Command {
        name: "setsecret",
        aliases: &[],
        usage: "setsecret [<secret>]",
        description: "set or clear the secret for later puts and removes",
        arity: Arity::Between(0, 1),
        handler: set_secret,
    },
    Command {
        name: "locals",
        aliases: &["localdata"],
        usage: "locals",
        description: "dump locally stored entries",
        arity: Arity::Exact(0),
        handler: locals,
    },
    Command {
        name: "help",
        aliases: &["?"],
        usage: "help",
        description: "list commands",
        arity: Arity::Exact(0),
        handler: help,
    },
    Command {
        name: "quit",
        aliases: &["exit"],
        usage: "quit",
        description: "close this session",
        arity: Arity::Exact(0),
        handler: quit,
    },
    Command {
        name: "halt",
        aliases: &["shutdown"],
        usage: "halt",
        description: "stop every session and the node",
        arity: Arity::Exact(0),
        handler: halt,
    },
    Command {
        name: "clear",
        aliases: &[],
        usage: "clear",
        description: "clear routing state",
        arity: Arity::Exact(0),
        handler: clear,
    },
    Command {
        name: "suspend",
        aliases: &[],
        usage: "suspend",
        description: "suspend the node and stop admitting remote sessions",
        arity: Arity::Exact(0),
        handler: suspend,
    },
    Command {
        name: "resume",
        aliases: &[],
        usage: "resume",
        description: "resume the node and admit remote sessions again",
        arity: Arity::Exact(0),
        handler: resume,
    },
];

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn format_value(value: &ValueInfo) -> String {
    let lock = if value.protected { " (protected)" } else { "" };
    format!("{} ttl={}s{}", value.value, value.ttl.as_secs(), lock)
}

fn status(ctx: &mut CommandContext<'_>, _: &[String]) -> HandlerResult {
    let status = ctx.backend().status()?;
    let sessions = ctx.server().sessions()?;
    let accepting = ctx.server().is_accepting()?;

    ctx.println(format_args!("self address: {}", status.self_address));
    ctx.println(format_args!(
        "contact: {}",
        status.contact.as_deref().unwrap_or("none")
    ));
    ctx.println(format_args!("upnp: {}", on_off(status.upnp)));
    ctx.println(format_args!(
        "node: {}",
        if status.stopped {
            "stopped"
        } else if status.suspended {
            "suspended"
        } else {
            "running"
        }
    ));
    ctx.println(format_args!("keys: {}", status.keys));
    ctx.println(format_args!("ttl: {}s", status.ttl.as_secs()));
    ctx.println(format_args!("secret: {}", on_off(status.secret_set)));
    ctx.println(format_args!(
        "shell: {}, {} session(s)",
        if accepting { "accepting" } else { "suspended" },
        sessions.len()
    ));
    for info in sessions {
        let marker = if info.id == ctx.session() { " *" } else { "" };
        match info.peer {
            Some(peer) => ctx.println(format_args!(
                "  {} {} {} commands={}{}",
                info.id, info.kind, peer, info.commands, marker
            )),
            None => ctx.println(format_args!(
                "  {} {} commands={}{}",
                info.id, info.kind, info.commands, marker
            )),
        }
    }
    Ok(Flow::Continue)
}

fn init(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    ctx.backend().join(&args[0])?;
    ctx.println(format_args!("joined via {}", args[0]));
    Ok(Flow::Continue)
}

fn get(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    for key in args {
        let values = ctx.backend().get(key)?;
        if values.is_empty() {
            ctx.println(format_args!("{}: (not found)", key));
        }
        for value in &values {
            ctx.println(format_args!("{}: {}", key, format_value(value)));
        }
    }
    Ok(Flow::Continue)
}

fn put(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let (key, values) = (&args[0], &args[1..]);
    let previous = ctx.backend().put(key, values)?;

    ctx.println(format_args!("stored {} value(s) under {}", values.len(), key));
    for value in &previous {
        ctx.println(format_args!("previous: {}", format_value(value)));
    }
    Ok(Flow::Continue)
}

fn remove(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let (key, values) = (&args[0], &args[1..]);
    let removed = ctx.backend().remove(key, values)?;

    ctx.println(format_args!("removed {} value(s) from {}", removed.len(), key));
    for value in &removed {
        ctx.println(format_args!("removed: {}", format_value(value)));
    }
    Ok(Flow::Continue)
}

fn set_ttl(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let secs: u64 = args[0]
        .parse()
        .map_err(|_| CommandError::InvalidArgument(format!("not a number of seconds: {}", args[0])))?;
    ctx.backend().set_ttl(Duration::from_secs(secs))?;
    ctx.println(format_args!("ttl set to {}s", secs));
    Ok(Flow::Continue)
}

fn set_secret(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let secret = args.first().cloned();
    let cleared = secret.is_none();
    ctx.backend().set_secret(secret)?;
    ctx.println(if cleared { "secret cleared" } else { "secret set" });
    Ok(Flow::Continue)
}

fn locals(ctx: &mut CommandContext<'_>, _: &[String]) -> HandlerResult {
    let entries = ctx.backend().local_entries()?;
    if entries.is_empty() {
        ctx.println("(no local data)");
    }
    for (key, values) in &entries {
        for value in values {
            ctx.println(format_args!("{}: {}", key, format_value(value)));
        }
    }
    Ok(Flow::Continue)
}

fn help(ctx: &mut CommandContext<'_>, _: &[String]) -> HandlerResult {
    let registry = ctx.server().registry().clone();
    for command in registry.list() {
        if command.aliases.is_empty() {
            ctx.println(format_args!("{:<34}{}", command.usage, command.description));
        } else {
            ctx.println(format_args!(
                "{:<34}{} (alias: {})",
                command.usage,
                command.description,
                command.aliases.join(", ")
            ));
        }
    }
    Ok(Flow::Continue)
}

fn quit(_: &mut CommandContext<'_>, _: &[String]) -> HandlerResult {
    Ok(Flow::Close)
}

fn halt(ctx: &mut CommandContext<'_>, _: &[String]) -> HandlerResult {
    ctx.println("halting.");
    ctx.server().halt()?;
    Ok(Flow::Close)
}

fn clear(ctx: &mut CommandContext<'_>, _: &[String]) -> HandlerResult {
    ctx.backend().clear_routing()?;
    ctx.println("routing state cleared");
    Ok(Flow::Continue)
}

fn suspend(ctx: &mut CommandContext<'_>, _: &[String]) -> HandlerResult {
    ctx.server().suspend()?;
    ctx.println("suspended.");
    Ok(Flow::Continue)
}

fn resume(ctx: &mut CommandContext<'_>, _: &[String]) -> HandlerResult {
    ctx.server().resume()?;
    ctx.println("resumed.");
    Ok(Flow::Continue)
}
