//! Basket queries over the ledger's spendable outputs.

use serde::{Deserialize, Serialize};

use crate::config::ProtocolConfig;
use crate::error::Result;
use crate::ledger::{Ledger, ListOutputsArgs, OutputRecord};
use crate::token::{CustodyMetadata, SpendableToken};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    /// Output carries at least one of the tags.
    #[default]
    Any,
    /// Output carries every tag.
    All,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    pub tags: Vec<String>,
    #[serde(default)]
    pub mode: TagMode,
}

impl TagFilter {
    pub fn any<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            mode: TagMode::Any,
        }
    }

    pub fn all<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            mode: TagMode::All,
        }
    }

    /// An empty filter matches everything.
    pub fn matches(&self, output_tags: &[String]) -> bool {
        if self.tags.is_empty() {
            return true;
        }
        let has = |tag: &String| output_tags.iter().any(|t| t == tag);
        match self.mode {
            TagMode::Any => self.tags.iter().any(has),
            TagMode::All => self.tags.iter().all(has),
        }
    }
}

fn to_spendable(record: OutputRecord) -> SpendableToken {
    let custom_instructions = record.custom_instructions.as_deref().and_then(|text| {
        serde_json::from_str::<CustodyMetadata>(text)
            .inspect_err(|e| {
                log::warn!(
                    "output {} has unreadable custody metadata: {e}",
                    record.outpoint
                )
            })
            .ok()
    });
    SpendableToken {
        txid: record.outpoint.txid,
        vout: record.outpoint.vout,
        locking_script: record.locking_script,
        satoshis: record.satoshis,
        tags: record.tags,
        envelope: record.envelope,
        custom_instructions,
        created_at: record.created_at,
    }
}

/// Spendable tokens in the protocol basket, newest first.
pub async fn list_tokens<L: Ledger + ?Sized>(
    ledger: &L,
    config: &ProtocolConfig,
    filter: Option<TagFilter>,
) -> Result<Vec<SpendableToken>> {
    let records = ledger
        .list_outputs(ListOutputsArgs {
            basket: config.basket.clone(),
            tags: filter.filter(|f| !f.tags.is_empty()),
            include_envelope: true,
        })
        .await?;

    let mut tokens: Vec<SpendableToken> = records.into_iter().map(to_spendable).collect();
    // stable: ledgers already return newest first, ties keep their order
    tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    log::debug!("basket {}: {} spendable tokens", config.basket, tokens.len());
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn any_and_all_modes() {
        let output = tags(&["groceries", "urgent"]);
        assert!(TagFilter::any(["urgent", "work"]).matches(&output));
        assert!(!TagFilter::all(["urgent", "work"]).matches(&output));
        assert!(TagFilter::all(["urgent", "groceries"]).matches(&output));
        assert!(!TagFilter::any(["work"]).matches(&output));
    }

    #[test]
    fn empty_filter_matches_untagged() {
        assert!(TagFilter::default().matches(&[]));
        assert!(TagFilter::all(Vec::<String>::new()).matches(&tags(&["x"])));
    }

    #[test]
    fn mode_wire_form() {
        let filter: TagFilter =
            serde_json::from_str(r#"{"tags":["a"],"mode":"all"}"#).unwrap();
        assert_eq!(filter.mode, TagMode::All);
    }
}
