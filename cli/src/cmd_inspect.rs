//! `chainshard inspect` — summarise a shard file.

use std::path::Path;

use anyhow::{Context, Result};

use chainshard_storage::read_shard_file;

pub fn run(file: &Path, as_json: bool) -> Result<()> {
    let shard = read_shard_file(file).with_context(|| format!("reading {}", file.display()))?;
    let first = shard.rows.first().map(|r| r.block_number);

    if as_json {
        let out = serde_json::json!({
            "file": file.display().to_string(),
            "columns": shard.columns,
            "rows": shard.rows.len(),
            "first_block": first,
            "committed_through": shard.committed_through(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("File:              {}", file.display());
    println!("Columns:           {}", shard.columns.join(", "));
    println!("Rows:              {}", shard.rows.len());
    match (first, shard.committed_through()) {
        (Some(first), Some(last)) => {
            println!("Blocks:            {first} ..= {last}");
            println!("Resume from:       {}", last + 1);
        }
        _ => println!("Blocks:            (empty shard)"),
    }
    Ok(())
}
