//! Analysis prompt assembled from a run's text summary.

use quotefetch_core::Record;

use crate::sink;

const ANALYSIS_SECTIONS: &[&str] = &[
    "Short-term view: recent price and volume behaviour, momentum, unusual sessions.",
    "Long-term trend: direction over the full history and where the latest price sits in it.",
    "Fund flow: margin balances, large-order activity and what they imply about positioning.",
    "Technical indicators: moving averages, MACD and KDJ readings with crossovers.",
    "Support and resistance: key levels, with concrete trading advice and stop levels.",
];

/// Prompt asking for a structured analysis of `data`.
pub fn analysis_prompt(data: &str) -> String {
    let mut prompt = String::from(
        "You are a securities analyst. Analyse the market data below and answer in sections:\n",
    );
    for (i, section) in ANALYSIS_SECTIONS.iter().enumerate() {
        prompt.push_str(&format!("{}. {section}\n", i + 1));
    }
    prompt.push_str("\nData:\n");
    prompt.push_str(data.trim_end());
    prompt.push('\n');
    prompt
}

/// Records as one headed block, in the same layout as the text summary.
pub fn records_block(records: &[Record], header: &str) -> serde_json::Result<String> {
    sink::render_text_block(records, header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_lists_sections_then_data() {
        let prompt = analysis_prompt("==== source: hsmy_lscj / 000001 ====\n{}\n\n");
        assert!(prompt.contains("1. Short-term view"));
        assert!(prompt.contains("MACD and KDJ"));
        assert!(prompt.contains("5. Support and resistance"));
        let data_at = prompt.find("Data:\n").unwrap();
        assert!(prompt[data_at..].contains("source: hsmy_lscj / 000001"));
        assert!(prompt.ends_with("{}\n"));
    }

    #[test]
    fn records_block_uses_summary_layout() {
        let record = json!({"date": "2024-01-01"}).as_object().cloned().unwrap();
        let block = records_block(&[record], "source: e / s").unwrap();
        assert!(block.starts_with("==== source: e / s ====\n"));
        assert!(block.contains("\"date\": \"2024-01-01\""));
    }
}
