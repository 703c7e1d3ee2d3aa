use std::collections::BTreeMap;
use std::fmt::Write;
use crate::models::{PoolRecord, PoolStatsSnapshot, PoolSummary};

pub const ITEMS_KEY: &str = "items";
pub const POOL_KEY_PREFIX: &str = "pool:";

const TABLE_HEADER: [&str; 8] = [
    "Logo", "Coin A", "Logo", "Coin B", "Price", "Price Rev", "Pure TVL", "Vol 24H",
];

pub fn pool_key(symbol: &str) -> String {
    format!("{}{}", POOL_KEY_PREFIX, symbol)
}

/// Lenient decimal read used by every display field. Unparsable or
/// non-finite input reads as zero.
fn decimal(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

pub fn format_price(raw: &str) -> String {
    format!("{:.6}", decimal(raw))
}

/// `1/price` to 6 places, or the literal `"0"` when the price is zero.
pub fn format_price_rev(raw: &str) -> String {
    let price = decimal(raw);
    if price == 0.0 {
        return "0".to_string();
    }
    format!("{:.6}", 1.0 / price)
}

fn format_rounded(raw: &str) -> String {
    format!("{:.0}", decimal(raw))
}

pub fn summarize(pool: &PoolRecord) -> PoolSummary {
    PoolSummary {
        tvl: format_rounded(&pool.pure_tvl_in_usd),
        volume: format_rounded(&pool.vol_in_usd_24h),
        total_apr: format!("{:.0}", decimal(&pool.total_apr) * 100.0),
        price: format_price(&pool.price),
        price_rev: format_price_rev(&pool.price),
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn logo_cell(out: &mut String, url: &str) {
    let _ = write!(
        out,
        "<td><image style='width: 32px; height: 32px' src='{}'></td>",
        escape_html(url)
    );
}

fn text_cell(out: &mut String, text: &str) {
    let _ = write!(out, "<td>{}</td>", escape_html(text));
}

pub fn render_table(snapshot: &PoolStatsSnapshot) -> String {
    let mut out = String::from("<html><body><table><tr>");
    for title in TABLE_HEADER {
        text_cell(&mut out, title);
    }
    out.push_str("</tr>");

    for pool in snapshot.pools() {
        out.push_str("<tr>");
        logo_cell(&mut out, &pool.coin_a.logo_url);
        text_cell(&mut out, &pool.coin_a.symbol);
        logo_cell(&mut out, &pool.coin_b.logo_url);
        text_cell(&mut out, &pool.coin_b.symbol);
        text_cell(&mut out, &format_price(&pool.price));
        text_cell(&mut out, &format_price_rev(&pool.price));
        text_cell(&mut out, &pool.pure_tvl_in_usd);
        text_cell(&mut out, &pool.vol_in_usd_24h);
        out.push_str("</tr>");
    }

    out.push_str("</table></body></html>");
    out
}

/// Derives every publishable artifact of a snapshot: the `items` table and one
/// `pool:<symbol>` summary per distinct symbol (first occurrence wins).
pub fn render(snapshot: &PoolStatsSnapshot) -> BTreeMap<String, String> {
    let mut artifacts = BTreeMap::new();
    artifacts.insert(ITEMS_KEY.to_string(), render_table(snapshot));

    for pool in snapshot.pools() {
        let key = pool_key(&pool.symbol);
        if artifacts.contains_key(&key) {
            continue;
        }
        match serde_json::to_string(&summarize(pool)) {
            Ok(json) => {
                artifacts.insert(key, json);
            }
            Err(e) => tracing::warn!("skipping summary for {}: {}", pool.symbol, e),
        }
    }

    artifacts
}
