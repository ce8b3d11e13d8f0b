use bookchat_core::{Message, MessageId, Role, Source};
use chrono::Local;
use colored::*;
use std::io::{self, Write};
use pulldown_cmark::{CodeBlockKind, Event as MdEvent, HeadingLevel, Options, Parser as MdParser, Tag};
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::{as_24_bit_terminal_escaped, LinesWithEndings};

/// Print one conversation entry: role label, local time, body and sources
pub fn print_message(message: &Message) {
    println!("{}", format_header(message));
    match message.role {
        Role::Assistant if message.content.is_empty() => println!("{}", "(no response)".dimmed()),
        Role::Assistant => println!("{}", render_markdown(&message.content).trim_end()),
        Role::Error => println!("{}", message.content.red()),
        Role::User => println!("{}", message.content),
    }
    if !message.sources.is_empty() {
        print!("{}", format_sources(&message.sources));
    }
}

pub fn print_messages(messages: &[Message]) {
    for message in messages {
        print_message(message);
        println!();
    }
}

fn format_header(message: &Message) -> String {
    let label = match message.role {
        Role::User => "You".green().bold(),
        Role::Assistant => "Assistant".blue().bold(),
        Role::Error => "Error".red().bold(),
    };
    let time = message.timestamp.with_timezone(&Local).format("%H:%M");
    format!("{} {}", label, time.to_string().dimmed())
}

/// A streamed answer printed while it arrives.
///
/// Each update replaces the message content. When the new content extends
/// what is already on screen only the new tail is printed; otherwise the
/// whole content is printed again on a fresh line.
#[derive(Debug, Default)]
pub struct LiveMessage {
    id: Option<MessageId>,
    role: Option<Role>,
    printed: String,
}

impl LiveMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.role.is_some()
    }

    /// True for the message this printer has already put on screen
    pub fn shows(&self, message: &Message) -> bool {
        self.id.is_some() && message.id == self.id
    }

    pub fn update(&mut self, message: &Message) -> io::Result<()> {
        let mut stdout = io::stdout();
        write!(stdout, "{}", self.render_update(message))?;
        stdout.flush()
    }

    /// Ends the live output. `kept` says whether the message survived the
    /// exchange; a dropped placeholder gets no "(no response)" marker.
    pub fn finish(&self, kept: bool) {
        if !self.is_started() {
            return;
        }
        if kept && self.printed.is_empty() && self.role == Some(Role::Assistant) {
            println!("{}", "(no response)".dimmed());
        } else if !self.printed.is_empty() {
            println!();
        }
        println!();
    }

    fn render_update(&mut self, message: &Message) -> String {
        let mut output = String::new();
        if self.role != Some(message.role) {
            if !self.printed.is_empty() {
                output.push('\n');
            }
            output.push_str(&format_header(message));
            output.push('\n');
            self.printed.clear();
        }
        self.id = message.id;
        self.role = Some(message.role);

        let fresh = match message.content.strip_prefix(self.printed.as_str()) {
            Some(tail) => tail,
            None => {
                output.push('\n');
                message.content.as_str()
            }
        };
        match message.role {
            Role::Error => output.push_str(&fresh.red().to_string()),
            _ => output.push_str(fresh),
        }
        self.printed = message.content.clone();
        output
    }
}

/// Numbered citation list shown under an answer
pub fn format_sources(sources: &[Source]) -> String {
    let mut output = format!("{}\n", format!("Sources ({}):", sources.len()).cyan());
    for (idx, source) in sources.iter().enumerate() {
        output.push_str(&format!(
            "  {} {}\n",
            format!("Source {}:", idx + 1).bold(),
            source.content_snippet.trim()
        ));
    }
    output
}

/// Print an error that did not come from the conversation itself
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}

/// Show usage instructions when no prompt or action is provided
pub fn print_usage_instructions() {
    println!("{}", "Usage:".yellow().bold());
    println!("  {}", "bookchat \"your question\"".green().bold());
    println!("    Ask the book assistant a single question");
    println!();
    println!("  {}", "bookchat -i".green().bold());
    println!("    Start an interactive chat session");
    println!();
    println!("{}", "Options:".cyan());
    println!("  --context <TEXT>     Ground the question in a piece of selected text");
    println!("  --no-stream          Wait for a single JSON answer");
    println!("  --api-url <URL>      Backend API base URL");
    println!("  --session <ID>       Continue an existing session");
    println!("  --history            Show the session's stored history");
    println!("  --end-session        End the session on the backend");
    println!("  --help               Show this help message");
    println!();
}

/// Commands understood by interactive mode
pub fn print_interactive_help() {
    println!("{}", "Commands:".cyan());
    println!("  /context <text>   Ground the next question in selected text (no text clears it)");
    println!("  /history          Show what the backend stored for this session");
    println!("  /clear            Clear the local conversation");
    println!("  /session          Show the session id");
    println!("  /help             Show this help");
    println!("  exit | quit       Leave the chat");
}

/// Render markdown in the terminal with syntax highlighting for code blocks
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = MdParser::new_ext(markdown, options);

    let syntax_set = SyntaxSet::load_defaults_newlines();
    let theme_set = ThemeSet::load_defaults();
    let theme = theme_set
        .themes
        .get("base16-ocean.dark")
        .or_else(|| theme_set.themes.values().next());

    let mut output = String::new();
    let mut code_block: Option<(String, String)> = None;
    let mut lists: Vec<Option<u64>> = Vec::new();
    let mut emphasis_depth = 0usize;
    let mut strong_depth = 0usize;

    for event in parser {
        match event {
            MdEvent::Start(Tag::Heading(level, ..)) => {
                ensure_blank_line(&mut output);
                let marker = match level {
                    HeadingLevel::H1 => "#",
                    HeadingLevel::H2 => "##",
                    _ => "###",
                };
                output.push_str(&format!("{} ", marker.bright_cyan().bold()));
                strong_depth += 1;
            }
            MdEvent::End(Tag::Heading(..)) => {
                strong_depth = strong_depth.saturating_sub(1);
                output.push('\n');
            }
            MdEvent::Start(Tag::Paragraph) => {
                if lists.is_empty() {
                    ensure_blank_line(&mut output);
                }
            }
            MdEvent::End(Tag::Paragraph) => {
                if lists.is_empty() {
                    output.push('\n');
                }
            }
            MdEvent::Start(Tag::BlockQuote) => {
                ensure_blank_line(&mut output);
                output.push_str(&format!("{} ", "│".dimmed()));
            }
            MdEvent::End(Tag::BlockQuote) => {}
            MdEvent::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) => lang.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                code_block = Some((lang, String::new()));
            }
            MdEvent::End(Tag::CodeBlock(_)) => {
                if let Some((lang, code)) = code_block.take() {
                    ensure_blank_line(&mut output);
                    if !lang.is_empty() {
                        output.push_str(&format!("{}:\n", lang.cyan()));
                    }
                    output.push_str(&"─".repeat(40).dimmed().to_string());
                    output.push('\n');

                    let syntax = syntax_set
                        .find_syntax_by_token(&lang)
                        .unwrap_or_else(|| syntax_set.find_syntax_plain_text());
                    match theme {
                        Some(theme) => {
                            let mut highlighter = HighlightLines::new(syntax, theme);
                            for line in LinesWithEndings::from(&code) {
                                let highlighted = highlighter
                                    .highlight_line(line, &syntax_set)
                                    .unwrap_or_default();
                                output.push_str(&as_24_bit_terminal_escaped(&highlighted, false));
                            }
                            output.push_str("\x1b[0m");
                        }
                        None => output.push_str(&code),
                    }
                    if !output.ends_with('\n') {
                        output.push('\n');
                    }
                    output.push_str(&"─".repeat(40).dimmed().to_string());
                    output.push('\n');
                }
            }
            MdEvent::Start(Tag::List(start)) => {
                if lists.is_empty() {
                    ensure_blank_line(&mut output);
                } else if !output.ends_with('\n') {
                    output.push('\n');
                }
                lists.push(start);
            }
            MdEvent::End(Tag::List(_)) => {
                lists.pop();
            }
            MdEvent::Start(Tag::Item) => {
                let indent = "  ".repeat(lists.len().saturating_sub(1));
                let bullet = match lists.last_mut() {
                    Some(Some(n)) => {
                        let bullet = format!("{}.", n);
                        *n += 1;
                        bullet.yellow()
                    }
                    _ => "•".yellow(),
                };
                output.push_str(&format!("{}{} ", indent, bullet));
            }
            MdEvent::End(Tag::Item) => {
                if !output.ends_with('\n') {
                    output.push('\n');
                }
            }
            MdEvent::Start(Tag::Emphasis) => emphasis_depth += 1,
            MdEvent::End(Tag::Emphasis) => emphasis_depth = emphasis_depth.saturating_sub(1),
            MdEvent::Start(Tag::Strong) => strong_depth += 1,
            MdEvent::End(Tag::Strong) => strong_depth = strong_depth.saturating_sub(1),
            MdEvent::End(Tag::Link(_, url, _)) => {
                output.push_str(&format!(" ({})", url.underline()));
            }
            MdEvent::Code(code) => {
                output.push_str(&format!("{}", code.on_bright_black().white()));
            }
            MdEvent::Text(text) => {
                if let Some((_, code)) = code_block.as_mut() {
                    code.push_str(&text);
                } else {
                    let mut styled = text.normal();
                    if strong_depth > 0 {
                        styled = styled.bold();
                    }
                    if emphasis_depth > 0 {
                        styled = styled.italic();
                    }
                    output.push_str(&styled.to_string());
                }
            }
            MdEvent::TaskListMarker(done) => {
                output.push_str(if done { "[x] " } else { "[ ] " });
            }
            MdEvent::SoftBreak => output.push(' '),
            MdEvent::HardBreak => output.push('\n'),
            MdEvent::Rule => {
                ensure_blank_line(&mut output);
                output.push_str(&"─".repeat(40).dimmed().to_string());
                output.push('\n');
            }
            MdEvent::Html(html) => output.push_str(&html),
            _ => {}
        }
    }

    output.trim_start_matches('\n').to_string()
}

fn ensure_blank_line(output: &mut String) {
    if output.is_empty() || output.ends_with("\n\n") {
        return;
    }
    if output.ends_with('\n') {
        output.push('\n');
    } else {
        output.push_str("\n\n");
    }
}
