use chrono::NaiveDate;
use minijinja::{Environment, ErrorKind};
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::model::LetterRequest;

// NOTE:
// The role instruction is sent as the system message; everything that
// depends on the form goes through the user template.

const LETTER_TEMPLATE_NAME: &str = "letter_prompt";

/// Minimal prompt used to confirm the credential is accepted.
pub const HEALTH_PROBE_PROMPT: &str = "Say 'OK' if you can read this.";

macro_rules! prompt_file {
    ($name:literal) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/lang/en/", $name))
    };
}

static TEMPLATES: Lazy<Result<Environment<'static>, String>> =
    Lazy::new(|| load_templates().map_err(|err| err.to_string()));

fn load_templates() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_template(LETTER_TEMPLATE_NAME, prompt_file!("letter_prompt.jinja"))?;
    Ok(env)
}

fn templates() -> Result<&'static Environment<'static>, minijinja::Error> {
    TEMPLATES.as_ref().map_err(|err| {
        minijinja::Error::new(
            ErrorKind::TemplateNotFound,
            format!("letter template failed to load: {err}"),
        )
    })
}

#[derive(Serialize)]
struct LetterPromptContext<'a> {
    name: &'a str,
    age: Option<&'a str>,
    gender: Option<&'static str>,
    date: String,
    list_status: &'static str,
    good_list: bool,
    good_things: Option<&'a str>,
    bad_things: Option<&'a str>,
    gifts: Option<&'a str>,
    notes: Option<&'a str>,
}

pub fn system_prompt() -> &'static str {
    prompt_file!("santa_system.txt").trim()
}

/// Renders the user message for one letter. `today` is the date the letter
/// claims to be written on.
pub fn build_letter_prompt(
    req: &LetterRequest,
    today: NaiveDate,
) -> Result<String, minijinja::Error> {
    let ctx = LetterPromptContext {
        name: req.child_name(),
        age: req.age(),
        gender: req.gender.as_word(),
        date: format_letter_date(today),
        list_status: if req.is_on_good_list {
            "GOOD LIST"
        } else {
            "NAUGHTY LIST"
        },
        good_list: req.is_on_good_list,
        good_things: non_blank(&req.good_things),
        bad_things: non_blank(&req.bad_things),
        gifts: req.requested_gifts(),
        notes: non_blank(&req.additional_notes),
    };

    templates()?.get_template(LETTER_TEMPLATE_NAME)?.render(&ctx)
}

/// `December 3, 2025`
pub fn format_letter_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

fn non_blank(text: &str) -> Option<&str> {
    Some(text.trim()).filter(|t| !t.is_empty())
}
