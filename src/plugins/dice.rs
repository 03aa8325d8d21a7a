use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

use super::{Plugin, PluginContext};
use crate::platform::{Attachment, BotRequest, BotResponse};

const COLOR: &str = "#00ff00";
const MAX_DICE: u32 = 20;

static N_SIDED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)$").expect("valid dice regex"));
static X_DY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)?d([0-9]+)$").expect("valid dice regex"));

/// `roll`, `roll 20`, `roll 3d6`, `roll d12`.
pub struct DicePlugin {
    config_path: PathBuf,
}

impl DicePlugin {
    pub fn new() -> Self {
        Self {
            config_path: PathBuf::new(),
        }
    }
}

/// Quantity and sides from dice notation; anything unparsable falls back to 1d6.
fn parse_notation(notation: Option<&str>) -> (u32, u32) {
    let mut qty = 1;
    let mut sides = 6;

    if let Some(notation) = notation {
        if let Some(caps) = N_SIDED.captures(notation) {
            sides = caps[1].parse().unwrap_or(sides);
        } else if let Some(caps) = X_DY.captures(notation) {
            // "d8" has no quantity; treat it as a single die
            qty = caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(1);
            sides = caps[2].parse().unwrap_or(sides);
        }
    }

    (qty.clamp(1, MAX_DICE), sides.max(1))
}

#[async_trait]
impl Plugin for DicePlugin {
    fn name(&self) -> &'static str {
        "Dice"
    }

    async fn init(&mut self, ctx: &PluginContext<'_>) -> Result<()> {
        info!("Init for plugin {}", self.name());
        self.config_path = ctx.config_path.clone();
        Ok(())
    }

    fn config_path(&self) -> &Path {
        &self.config_path
    }

    async fn handle(&self, req: &BotRequest) -> Option<BotResponse> {
        let (command, args) = req.command_and_args(1);
        if command != "roll" {
            return None;
        }
        debug!("Command: {}, Args: {:?}", command, args);

        let (qty, sides) = parse_notation(args.first().map(String::as_str));
        let results: Vec<String> = {
            let mut rng = rand::thread_rng();
            (0..qty)
                .map(|_| rng.gen_range(1..=sides).to_string())
                .collect()
        };

        Some(BotResponse::with_attachment(Attachment::new(
            COLOR,
            format!("Roll {} {}-sided dice", qty, sides),
            format!("You roll {}", results.join(", ")),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roll(text: &str) -> Option<BotResponse> {
        let req = BotRequest {
            text: text.to_string(),
            ..Default::default()
        };
        futures::executor::block_on(DicePlugin::new().handle(&req))
    }

    fn rolled_numbers(resp: &BotResponse) -> Vec<u32> {
        resp.attachments[0]
            .text
            .strip_prefix("You roll ")
            .unwrap()
            .split(", ")
            .map(|n| n.parse().unwrap())
            .collect()
    }

    #[test]
    fn test_parse_notation() {
        assert_eq!(parse_notation(None), (1, 6));
        assert_eq!(parse_notation(Some("20")), (1, 20));
        assert_eq!(parse_notation(Some("3d8")), (3, 8));
        assert_eq!(parse_notation(Some("d12")), (1, 12));
        assert_eq!(parse_notation(Some("0d0")), (1, 1));
        assert_eq!(parse_notation(Some("99d6")), (20, 6));
        assert_eq!(parse_notation(Some("lots")), (1, 6));
    }

    #[test]
    fn test_roll_2d6() {
        let resp = roll("roll 2d6").unwrap();
        assert_eq!(resp.attachments.len(), 1);
        assert_eq!(resp.attachments[0].title, "Roll 2 6-sided dice");
        assert_eq!(resp.attachments[0].color, COLOR);

        let numbers = rolled_numbers(&resp);
        assert_eq!(numbers.len(), 2);
        assert!(numbers.iter().all(|n| (1..=6).contains(n)));
    }

    #[test]
    fn test_default_roll() {
        let resp = roll("roll").unwrap();
        assert_eq!(resp.attachments[0].title, "Roll 1 6-sided dice");
        assert_eq!(rolled_numbers(&resp).len(), 1);
    }

    #[test]
    fn test_other_commands_declined() {
        assert!(roll("gem add x").is_none());
        assert!(roll("").is_none());
    }
}
