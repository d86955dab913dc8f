//! Open-Graph card pages.
//!
//! Each `[[og.cards]]` entry becomes a self-contained 1200×630 HTML page:
//! title, subtitle and description over a diagonal gradient from the card's
//! accent color to slate, with the brand mark in the corner. Turning the
//! page into a PNG is left to a browser screenshot.

use crate::config::{CardConfig, OgConfig};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CARD_WIDTH: u32 = 1200;
pub const CARD_HEIGHT: u32 = 630;

const CARD_CSS: &str = include_str!("../static/card.css");

#[derive(Error, Debug)]
pub enum CardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("card filename must be a plain .html file name: {0:?}")]
    InvalidFilename(String),
}

/// CSS background for a card's accent color.
pub fn gradient(color: &str) -> String {
    format!("background: linear-gradient(135deg, {color} 0%, #1e293b 100%);")
}

pub fn render_card(card: &CardConfig, brand: &str) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content=(format!("width={CARD_WIDTH}, initial-scale=1"));
                title { (card.title) " - Social Card" }
                style { (PreEscaped(CARD_CSS)) }
            }
            body style=(gradient(&card.color)) {
                div.card {
                    div.pattern {}
                    h1.title { (card.title) }
                    h2.subtitle { (card.subtitle) }
                    p.description { (card.description) }
                    div.brand { (brand) }
                }
            }
        }
    }
}

fn check_filename(name: &str) -> Result<(), CardError> {
    let plain = !name.contains(['/', '\\']) && name.ends_with(".html") && name != ".html";
    if plain {
        Ok(())
    } else {
        Err(CardError::InvalidFilename(name.to_string()))
    }
}

/// Write every configured card under `og.output_dir`. Returns the paths
/// written, in configuration order.
pub fn generate_cards(root: &Path, og: &OgConfig) -> Result<Vec<PathBuf>, CardError> {
    for card in &og.cards {
        check_filename(&card.filename)?;
    }
    let dir = root.join(&og.output_dir);
    fs::create_dir_all(&dir)?;

    og.cards
        .iter()
        .map(|card| {
            let path = dir.join(&card.filename);
            fs::write(&path, render_card(card, &og.brand).into_string())?;
            tracing::debug!(path = %path.display(), "wrote card");
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn card(filename: &str) -> CardConfig {
        CardConfig {
            filename: filename.to_string(),
            title: "Jo Example".to_string(),
            subtitle: "Resume".to_string(),
            description: "Reliability & infrastructure".to_string(),
            color: "#7c3aed".to_string(),
        }
    }

    #[test]
    fn card_contains_content_and_gradient() {
        let html = render_card(&card("og.html"), "EXAMPLE.NET").into_string();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Jo Example - Social Card</title>"));
        assert!(html.contains(r#"<h1 class="title">Jo Example</h1>"#));
        assert!(html.contains(r#"<h2 class="subtitle">Resume</h2>"#));
        assert!(html.contains("linear-gradient(135deg, #7c3aed 0%, #1e293b 100%)"));
        assert!(html.contains(r#"<div class="brand">EXAMPLE.NET</div>"#));
        assert!(html.contains("width=1200"));
    }

    #[test]
    fn text_is_escaped_css_is_not() {
        let html = render_card(&card("og.html"), "<b>").into_string();
        assert!(html.contains("Reliability &amp; infrastructure"));
        assert!(html.contains("&lt;b&gt;"));
        assert!(html.contains(r#""Segoe UI""#));
    }

    #[test]
    fn generates_into_output_dir() {
        let tmp = TempDir::new().unwrap();
        let og = OgConfig {
            brand: "X".to_string(),
            output_dir: "social".to_string(),
            cards: vec![card("og-home.html"), card("og-resume.html")],
        };
        let written = generate_cards(tmp.path(), &og).unwrap();
        assert_eq!(
            written,
            vec![
                tmp.path().join("social/og-home.html"),
                tmp.path().join("social/og-resume.html")
            ]
        );
        assert!(written.iter().all(|p| p.is_file()));
    }

    #[test]
    fn path_like_filenames_rejected_before_writing() {
        let tmp = TempDir::new().unwrap();
        let og = OgConfig {
            cards: vec![card("ok.html"), card("../escape.html")],
            ..OgConfig::default()
        };
        assert!(matches!(
            generate_cards(tmp.path(), &og),
            Err(CardError::InvalidFilename(_))
        ));
        assert!(!tmp.path().join("cards").exists());
    }
}
