//! The `bubblegrade init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("bubblegrade.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("keys")?;
    write_if_missing(Path::new("keys/example.toml"), EXAMPLE_KEY)?;

    println!("\nNext steps:");
    println!("  1. Set BUBBLEGRADE_GEMINI_KEY or edit bubblegrade.toml with your API keys");
    println!("  2. Run: bubblegrade validate --key keys/example.toml");
    println!("  3. Run: bubblegrade key import --file keys/example.toml");
    println!("  4. Run: bubblegrade grade --image sheet.jpg --student \"Name\" --save");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# bubblegrade configuration

default_provider = "gemini"
default_model = "gemini-2.5-flash"
default_temperature = 0.0
max_tokens = 8192
parallelism = 2
request_locations = false
data_dir = ".bubblegrade"

[layout]
total_questions = 60
questions_per_column = 15

[providers.gemini]
type = "gemini"
api_key = "${GEMINI_API_KEY}"

# [providers.anthropic]
# type = "anthropic"
# api_key = "${ANTHROPIC_API_KEY}"

# [providers.openai]
# type = "openai"
# api_key = "${OPENAI_API_KEY}"
"#;

const EXAMPLE_KEY: &str = r#"# Answer key for a 60-question sheet, answers A-E.
# Either give every answer as a sequence, or list them under [answers].

sequence = """
ABCDEABCDEABCDE\
BCDEABCDEABCDEA\
CDEABCDEABCDEAB\
DEABCDEABCDEABC\
"""

[sheet]
name = "Example exam"
total_questions = 60
questions_per_column = 15

# Individual entries override the sequence.
[answers]
1 = "A"
"#;
