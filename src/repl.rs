use log::{ error, info };
use std::error::Error;
use std::io::Write;
use tokio::io::{ AsyncBufReadExt, BufReader };
use tokio_util::sync::CancellationToken;

use crate::chat::{ ChatObserver, ChatState, ChatWidget };
use crate::models::chat::{ ConversationTurn, Role };

const HELP: &str = "Commandes : /attach <fichier>, /detach <n>, /files, /reset, /help, /quit";

/// Prints only the text appended since the previous update.
#[derive(Default)]
pub struct TerminalObserver {
    printed: usize,
}

impl ChatObserver for TerminalObserver {
    fn on_state(&mut self, state: ChatState) {
        match state {
            ChatState::Streaming => {
                self.printed = 0;
                print!("tuteur> ");
            }
            ChatState::Completed => println!(),
            _ => {}
        }
        let _ = std::io::stdout().flush();
    }

    fn on_update(&mut self, conversation: &[ConversationTurn]) {
        let Some(last) = conversation.last() else {
            return;
        };
        if last.role != Role::Assistant {
            return;
        }
        let text = last.content.text();
        if let Some(fresh) = text.get(self.printed..) {
            print!("{}", fresh);
            self.printed = text.len();
        }
        let _ = std::io::stdout().flush();
    }
}

/// Sends one message with Ctrl-C wired to cancellation.
pub async fn send_with_interrupt(widget: &mut ChatWidget, text: &str) -> bool {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let mut observer = TerminalObserver::default();
    let result = widget.send(text, &mut observer, &token).await;
    watcher.abort();

    match result {
        Ok(_) => true,
        Err(e) => {
            println!();
            eprintln!("! {}", e.user_message());
            false
        }
    }
}

async fn handle_command(widget: &mut ChatWidget, line: &str) -> bool {
    let (command, arg) = match line.split_once(' ') {
        Some((c, a)) => (c, a.trim()),
        None => (line, ""),
    };

    match command {
        "/quit" | "/exit" => {
            return false;
        }
        "/attach" if !arg.is_empty() => {
            match widget.pending_mut().add_file(arg).await {
                Ok(()) => {
                    if let Some(attachment) = widget.pending().last() {
                        println!("+ {} ({})", attachment.name, attachment.mime_type);
                    }
                }
                Err(e) => eprintln!("! {}", e.user_message()),
            }
        }
        "/detach" => {
            let removed = arg
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| widget.pending_mut().remove(i));
            match removed {
                Some(attachment) => println!("- {}", attachment.name),
                None => eprintln!("! Numéro de fichier invalide."),
            }
        }
        "/files" => {
            if widget.pending().is_empty() {
                println!("Aucun fichier joint.");
            }
            for (i, attachment) in widget.pending().iter().enumerate() {
                println!("{}. {} ({})", i + 1, attachment.name, attachment.mime_type);
            }
        }
        "/reset" => {
            widget.reset();
            println!("Nouvelle conversation.");
        }
        _ => println!("{}", HELP),
    }
    true
}

pub async fn run(widget: &mut ChatWidget) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("Tuteur ({}) : posez votre question. {}", widget.subject(), HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("vous> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        if line.starts_with('/') {
            if !handle_command(widget, line).await {
                break;
            }
            continue;
        }
        if line.is_empty() && widget.pending().is_empty() {
            continue;
        }
        send_with_interrupt(widget, line).await;
    }

    info!("Session {} ended", widget.conversation_id());
    Ok(())
}

/// Non-interactive mode: one message, reply on stdout.
pub async fn run_once(widget: &mut ChatWidget, prompt: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    if send_with_interrupt(widget, prompt).await {
        Ok(())
    } else {
        error!("One-shot message failed");
        Err("chat request failed".into())
    }
}
