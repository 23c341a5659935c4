//! Line-oriented operator console for the `raffle-sync` binary.

use crate::admin::{AdminGate, AdminToken, MetadataUpdate};
use crate::error::{AppError, AppResult};
use crate::instance::InstanceHandle;
use crate::models::{Contact, TicketNumber};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Reserve(TicketNumber),
    Draw,
    Cancel(TicketNumber),
    Buy(Vec<TicketNumber>, Contact),
    Sweep,
    State(TicketNumber),
    Search(String),
    Page(u32),
    Stats,
    Activity,
    Mine,
    Status,
    Login(String),
    Prize(String),
    Describe(String),
    Image,
    Export,
    Wipe,
    Help,
    Quit,
}

pub const HELP: &str = "\
reserve <n> | draw | cancel <n> | buy <n>[,<n>..] <name>;<phone>;<email>
sweep | state <n> | search <text> | page <n> | stats | activity | mine | status
admin <passphrase> | prize <name> | describe <instruction> | image | export | wipe
help | quit";

fn parse_ticket(raw: &str) -> Result<TicketNumber, String> {
    raw.trim()
        .parse::<u32>()
        .map(TicketNumber::new)
        .map_err(|_| format!("not a ticket number: {}", raw))
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        let command = match verb.to_lowercase().as_str() {
            "reserve" => ConsoleCommand::Reserve(parse_ticket(rest)?),
            "draw" => ConsoleCommand::Draw,
            "cancel" => ConsoleCommand::Cancel(parse_ticket(rest)?),
            "buy" => {
                let (tickets, contact) = rest
                    .split_once(' ')
                    .ok_or_else(|| "usage: buy <n>[,<n>..] <name>;<phone>;<email>".to_string())?;
                let tickets = tickets
                    .split(',')
                    .map(parse_ticket)
                    .collect::<Result<Vec<_>, _>>()?;
                let fields: Vec<&str> = contact.split(';').collect();
                let [name, phone, email] = fields.as_slice() else {
                    return Err("contact must be <name>;<phone>;<email>".to_string());
                };
                ConsoleCommand::Buy(tickets, Contact::new(*name, *phone, *email))
            }
            "sweep" => ConsoleCommand::Sweep,
            "state" => ConsoleCommand::State(parse_ticket(rest)?),
            "search" => ConsoleCommand::Search(rest.to_string()),
            "page" => ConsoleCommand::Page(
                rest.parse()
                    .map_err(|_| format!("not a page number: {}", rest))?,
            ),
            "stats" => ConsoleCommand::Stats,
            "activity" => ConsoleCommand::Activity,
            "mine" => ConsoleCommand::Mine,
            "status" => ConsoleCommand::Status,
            "admin" => ConsoleCommand::Login(rest.to_string()),
            "prize" => ConsoleCommand::Prize(rest.to_string()),
            "describe" => ConsoleCommand::Describe(rest.to_string()),
            "image" => ConsoleCommand::Image,
            "export" => ConsoleCommand::Export,
            "wipe" => ConsoleCommand::Wipe,
            "help" | "" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(format!("unknown command: {}", other)),
        };
        Ok(command)
    }
}

fn admin_token(token: &Option<AdminToken>) -> AppResult<&AdminToken> {
    token
        .as_ref()
        .ok_or_else(|| AppError::Unauthorized("log in with `admin <passphrase>` first".to_string()))
}

fn render_tickets(tickets: &[TicketNumber]) -> String {
    tickets
        .iter()
        .map(|t| t.label())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read commands from stdin until `quit` or end of input
pub async fn run(handle: InstanceHandle, gate: AdminGate) -> AppResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut token: Option<AdminToken> = None;

    println!("{}", HELP);
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| AppError::Message(format!("stdin: {}", e)))?
    {
        let command = match ConsoleCommand::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("error: {}", e);
                continue;
            }
        };
        if command == ConsoleCommand::Quit {
            break;
        }
        if let Err(e) = execute(&handle, &gate, &mut token, command).await {
            println!("error: {}", e);
        }
    }

    info!("Console closed");
    Ok(())
}

async fn execute(
    handle: &InstanceHandle,
    gate: &AdminGate,
    token: &mut Option<AdminToken>,
    command: ConsoleCommand,
) -> AppResult<()> {
    match command {
        ConsoleCommand::Reserve(ticket) => {
            let r = handle.reserve(ticket).await?;
            println!("reserved {} until {}", r.ticket.label(), r.expires_at);
        }
        ConsoleCommand::Draw => {
            let r = handle.reserve_random().await?;
            println!("drew {} (reserved until {})", r.ticket.label(), r.expires_at);
        }
        ConsoleCommand::Cancel(ticket) => {
            println!("cancelled: {}", handle.cancel(ticket).await?);
        }
        ConsoleCommand::Buy(tickets, contact) => {
            let receipt = handle.purchase(tickets, contact).await?;
            println!(
                "sold {} to {}",
                render_tickets(&receipt.tickets),
                receipt.participant_id
            );
        }
        ConsoleCommand::Sweep => {
            let released = handle.sweep_now().await?;
            println!("released: {}", render_tickets(&released.into_iter().collect::<Vec<_>>()));
        }
        ConsoleCommand::State(ticket) => {
            println!("{}: {:?}", ticket.label(), handle.ticket_state(ticket).await?);
        }
        ConsoleCommand::Search(query) => {
            println!("{}", render_tickets(&handle.search(query, 0).await?));
        }
        ConsoleCommand::Page(page) => {
            println!("{}", render_tickets(&handle.search("", page).await?));
        }
        ConsoleCommand::Stats => {
            println!("{}", serde_json::to_string_pretty(&handle.stats().await?)?);
        }
        ConsoleCommand::Activity => {
            for event in handle.activity().await? {
                println!("{} {:?} {}", event.user_first_name, event.kind, event.ticket.label());
            }
        }
        ConsoleCommand::Mine => {
            for record in handle.my_purchases().await? {
                println!("{} {} ({})", record.ticket.label(), record.prize_label, record.timestamp);
            }
        }
        ConsoleCommand::Status => {
            println!("{}", serde_json::to_string_pretty(&handle.status().await?)?);
        }
        ConsoleCommand::Login(passphrase) => {
            *token = Some(gate.login(&passphrase)?);
            println!("admin mode on");
        }
        ConsoleCommand::Prize(name) => {
            let update = MetadataUpdate {
                prize_name: Some(name),
                ..MetadataUpdate::default()
            };
            let metadata = handle.update_metadata(admin_token(token)?, update).await?;
            println!("prize: {}", metadata.prize_name);
        }
        ConsoleCommand::Describe(instruction) => {
            let metadata = handle
                .generate_description(admin_token(token)?, &instruction)
                .await?;
            println!("{}", metadata.description);
        }
        ConsoleCommand::Image => {
            let metadata = handle.generate_image(admin_token(token)?).await?;
            println!("image: {} bytes", metadata.prize_image.len());
        }
        ConsoleCommand::Export => {
            let backup = handle.export_backup(admin_token(token)?).await?;
            println!("{}", backup.to_json()?);
        }
        ConsoleCommand::Wipe => {
            handle.wipe(admin_token(token)?).await?;
            println!("wiped");
        }
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_buy() {
        let command = ConsoleCommand::parse("buy 7,8 Ana Souza;11999998888;ana@x.com").unwrap();
        assert_eq!(
            command,
            ConsoleCommand::Buy(
                vec![TicketNumber::new(7), TicketNumber::new(8)],
                Contact::new("Ana Souza", "11999998888", "ana@x.com")
            )
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(ConsoleCommand::parse("reserve abc").is_err());
        assert!(ConsoleCommand::parse("buy 7 Ana;119").is_err());
        assert!(ConsoleCommand::parse("fly").is_err());
    }

    #[test]
    fn test_parse_simple_verbs() {
        assert_eq!(ConsoleCommand::parse("  DRAW "), Ok(ConsoleCommand::Draw));
        assert_eq!(ConsoleCommand::parse(""), Ok(ConsoleCommand::Help));
        assert_eq!(
            ConsoleCommand::parse("search ana maria"),
            Ok(ConsoleCommand::Search("ana maria".to_string()))
        );
    }
}
