/// Shell commands and name resolution

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "tasks",
    aliases: &["t", "ls"],
    usage: "tasks",
    description: "List task sections",
  },
  Command {
    name: "threads",
    aliases: &["th", "inbox"],
    usage: "threads",
    description: "List email threads",
  },
  Command {
    name: "more",
    aliases: &["next"],
    usage: "more",
    description: "Load the next page of threads",
  },
  Command {
    name: "messages",
    aliases: &["m", "msgs"],
    usage: "messages",
    description: "List inbox messages",
  },
  Command {
    name: "accounts",
    aliases: &["acc"],
    usage: "accounts",
    description: "List linked accounts",
  },
  Command {
    name: "unlink",
    aliases: &[],
    usage: "unlink <account_id>",
    description: "Remove a linked account",
  },
  Command {
    name: "add",
    aliases: &["a", "new"],
    usage: "add <section_id> <title...>",
    description: "Create a task at the top of a section",
  },
  Command {
    name: "edit",
    aliases: &["e"],
    usage: "edit <task_id> <title|due|body> <value...>",
    description: "Change one field of a task",
  },
  Command {
    name: "estimate",
    aliases: &["est"],
    usage: "estimate <task_id> <minutes>",
    description: "Set the time allocated to a task",
  },
  Command {
    name: "done",
    aliases: &["d", "complete"],
    usage: "done <task_id>",
    description: "Mark a task done",
  },
  Command {
    name: "undone",
    aliases: &["u", "reopen"],
    usage: "undone <task_id>",
    description: "Mark a task not done",
  },
  Command {
    name: "move",
    aliases: &["mv"],
    usage: "move <task_id> <section_id> <position> [from_section_id]",
    description: "Move a task to a 1-based position",
  },
  Command {
    name: "section-add",
    aliases: &["sa"],
    usage: "section-add <name...>",
    description: "Create a section",
  },
  Command {
    name: "section-rename",
    aliases: &["sr"],
    usage: "section-rename <section_id> <name...>",
    description: "Rename a section",
  },
  Command {
    name: "section-delete",
    aliases: &["sd"],
    usage: "section-delete <section_id>",
    description: "Delete a section",
  },
  Command {
    name: "read",
    aliases: &["r"],
    usage: "read <message_id>",
    description: "Mark a message read",
  },
  Command {
    name: "unread",
    aliases: &[],
    usage: "unread <message_id>",
    description: "Mark a message unread",
  },
  Command {
    name: "archive",
    aliases: &["ar"],
    usage: "archive <thread_id>",
    description: "Archive an email thread",
  },
  Command {
    name: "reply",
    aliases: &["re"],
    usage: "reply <message_id> <body...>",
    description: "Reply to an email after the undo window",
  },
  Command {
    name: "undo",
    aliases: &["z"],
    usage: "undo",
    description: "Cancel the pending reply",
  },
  Command {
    name: "refresh",
    aliases: &["sync"],
    usage: "refresh",
    description: "Refetch everything cached",
  },
  Command {
    name: "help",
    aliases: &["h", "?"],
    usage: "help",
    description: "Show this list",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Exit inboxsync",
  },
];

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0));
      continue;
    }

    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  // Stable sort keeps table order within a priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Resolve a typed word to a command, if it is unambiguous enough.
///
/// Exact names and aliases always win. A partial word resolves only when
/// its best match is the sole candidate at that priority.
pub fn resolve(word: &str) -> Option<&'static Command> {
  let suggestions = get_suggestions(word);
  let first = *suggestions.first()?;
  let word = word.to_lowercase();
  if first.name == word || first.aliases.contains(&word.as_str()) {
    return Some(first);
  }
  match suggestions.get(1) {
    Some(second) if second.name.starts_with(&word) == first.name.starts_with(&word) => None,
    _ => Some(first),
  }
}

/// One line per command for `help`.
pub fn help_text() -> String {
  let width = COMMANDS.iter().map(|c| c.usage.len()).max().unwrap_or(0);
  COMMANDS
    .iter()
    .map(|c| format!("  {:width$}  {}", c.usage, c.description, width = width))
    .collect::<Vec<_>>()
    .join("\n")
}
