use std::fs;
use std::io::{self, Write};
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;

use moneta::parser::{self, Command};

const DEFAULT_URL: &str = "http://127.0.0.1:7700";

fn main() {
    print_banner();

    let base_url = std::env::var("MONETA_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let client = match Client::builder().timeout(Duration::from_secs(120)).build() {
        Ok(client) => client,
        Err(e) => {
            println!("[\u{2717}] Could not build HTTP client: {}", e);
            return;
        }
    };

    match client.get(format!("{}/api/stats", base_url)).send() {
        Ok(resp) if resp.status().is_success() => {
            println!("[\u{2713}] Connected to moneta at {}!", base_url)
        }
        _ => {
            println!("[\u{2717}] Could not reach the server at {}.", base_url);
            println!("    Make sure 'moneta' is running, or point MONETA_URL at it.");
            return;
        }
    }
    println!("Type 'HELP' for supported commands or 'EXIT' to quit.\n");

    let stdin = io::stdin();
    let mut buffer = String::new();

    loop {
        print!("moneta> ");
        io::stdout().flush().unwrap();
        buffer.clear();

        if stdin.read_line(&mut buffer).unwrap() == 0 {
            break;
        }
        if buffer.trim().is_empty() {
            continue;
        }

        match parser::parse_command(&buffer) {
            Ok(cmd) => {
                if let Err(e) = execute_command(cmd, &client, &base_url) {
                    println!("[\u{26a0}\u{fe0f} Error] {}", e);
                }
            }
            Err(e) => {
                println!("[\u{2717} Syntax Error] {}", e);
                if buffer.to_uppercase().starts_with("ASK") && !buffer.contains('"') {
                    println!("    \u{2139}\u{fe0f}  Hint: quote the question: ASK \"how much on food?\"");
                } else if buffer.to_uppercase().starts_with("LIST") {
                    println!("    \u{2139}\u{fe0f}  Hint: Try 'LIST CATEGORY \"food\" FROM 2024-01-01 TO 2024-12-31'");
                }
            }
        }
    }
}

fn print_banner() {
    println!("\n==================================================");
    println!("   moneta CLI v0.1 - Ask your ledger anything");
    println!("==================================================\n");
}

fn print_help() {
    println!("\n--- Available Commands ---");
    println!("1. ASK:    ASK \"how much did I spend on food?\" [TOP 5]");
    println!("2. ADD:    ADD {{\"amount\": 12.5, \"description\": \"lunch\", \"merchant\": \"Deli\", \"category\": \"food\", \"date\": \"2024-01-05\"}}");
    println!("3. IMPORT: IMPORT \"path/to/transactions.json\"");
    println!("4. LIST:   LIST [CATEGORY \"food\"] [MERCHANT \"deli\"] [FROM 2024-01-01] [TO 2024-12-31]");
    println!("5. STATS:  Show engine counters");
    println!("6. EXIT:   Quit\n");
}

fn execute_command(cmd: Command, client: &Client, base_url: &str) -> Result<(), String> {
    match cmd {
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Ask { question, k } => perform_ask(client, base_url, question, k),
        Command::Add { json } => perform_add(client, base_url, json),
        Command::Import { path } => perform_import(client, base_url, path),
        Command::List {
            category,
            merchant,
            from,
            to,
        } => perform_list(client, base_url, category, merchant, from, to),
        Command::Stats => perform_stats(client, base_url),
        Command::Exit => std::process::exit(0),
    }
}

// --- REQUEST HANDLERS ---

fn perform_ask(
    client: &Client,
    base_url: &str,
    question: String,
    k: Option<usize>,
) -> Result<(), String> {
    let mut payload = serde_json::json!({ "query": question });
    if let Some(k) = k {
        payload["k"] = serde_json::json!(k);
    }

    let body = post_json(client, &format!("{}/api/query", base_url), &payload)?;

    println!("\n{}", body["answer"].as_str().unwrap_or("(no answer)"));
    if let Some(matches) = body["matches"].as_array() {
        println!("\nBacked by {} matches:", matches.len());
        for hit in matches {
            let record = &hit["record"];
            println!(
                "  \u{2022} ${:.2} at {} for {} ({}, dist {:.4})",
                record["amount"].as_f64().unwrap_or(0.0),
                record["merchant"].as_str().unwrap_or("?"),
                record["description"].as_str().unwrap_or("?"),
                record["date"].as_str().unwrap_or("?"),
                hit["distance"].as_f64().unwrap_or(0.0),
            );
        }
    }
    println!();
    Ok(())
}

fn perform_add(client: &Client, base_url: &str, json: String) -> Result<(), String> {
    let record: serde_json::Value =
        serde_json::from_str(&json).map_err(|e| format!("Invalid JSON: {}", e))?;
    if !record.is_object() {
        return Err("ADD expects a single JSON object".into());
    }

    let body = post_json(
        client,
        &format!("{}/api/transactions", base_url),
        &serde_json::json!([record]),
    )?;
    println!("[\u{2713} OK] Ingested {} record(s).", body["ingested"]);
    Ok(())
}

fn perform_import(client: &Client, base_url: &str, path: String) -> Result<(), String> {
    let contents =
        fs::read_to_string(&path).map_err(|e| format!("Could not read {}: {}", path, e))?;
    let batch: serde_json::Value =
        serde_json::from_str(&contents).map_err(|e| format!("Invalid JSON in {}: {}", path, e))?;
    if !batch.is_array() {
        return Err("IMPORT expects a JSON array of transactions".into());
    }

    let body = post_json(client, &format!("{}/api/transactions", base_url), &batch)?;
    println!(
        "[\u{2713} OK] Ingested {} record(s) from {}.",
        body["ingested"], path
    );
    Ok(())
}

fn perform_list(
    client: &Client,
    base_url: &str,
    category: Option<String>,
    merchant: Option<String>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<(), String> {
    let mut params: Vec<(&str, String)> = Vec::new();
    if let Some(c) = category {
        params.push(("category", c));
    }
    if let Some(m) = merchant {
        params.push(("merchant", m));
    }
    if let Some(f) = from {
        params.push(("from", f.to_string()));
    }
    if let Some(t) = to {
        params.push(("to", t.to_string()));
    }

    let resp = client
        .get(format!("{}/api/transactions", base_url))
        .query(&params)
        .send()
        .map_err(|e| e.to_string())?;
    let body = parse_response(resp)?;

    let empty = Vec::new();
    let records = body.as_array().unwrap_or(&empty);
    println!("\nFound {} transactions:", records.len());
    for record in records {
        let location = record["location"]
            .as_str()
            .map(|l| format!(" at {}", l))
            .unwrap_or_default();
        println!(
            "  \u{2022} {} | ${:.2} | {} | {} | {}{}",
            record["date"].as_str().unwrap_or("?"),
            record["amount"].as_f64().unwrap_or(0.0),
            record["merchant"].as_str().unwrap_or("?"),
            record["category"].as_str().unwrap_or("?"),
            record["description"].as_str().unwrap_or("?"),
            location,
        );
    }
    println!();
    Ok(())
}

fn perform_stats(client: &Client, base_url: &str) -> Result<(), String> {
    let resp = client
        .get(format!("{}/api/stats", base_url))
        .send()
        .map_err(|e| e.to_string())?;
    let body = parse_response(resp)?;

    println!("\n--- Engine Stats ---");
    println!("  Records:   {}", body["records"]);
    println!("  Dimension: {}", body["dimension"]);
    println!("  Embedder:  {}", body["embedder"].as_str().unwrap_or("?"));
    println!("  Generator: {}", body["generator"].as_str().unwrap_or("?"));
    println!();
    Ok(())
}

// --- HTTP PLUMBING ---

fn post_json(
    client: &Client,
    url: &str,
    payload: &serde_json::Value,
) -> Result<serde_json::Value, String> {
    let resp = client
        .post(url)
        .json(payload)
        .send()
        .map_err(|e| e.to_string())?;
    parse_response(resp)
}

fn parse_response(resp: reqwest::blocking::Response) -> Result<serde_json::Value, String> {
    let status = resp.status();
    let body: serde_json::Value = resp
        .json()
        .map_err(|e| format!("Unreadable server response: {}", e))?;

    if !status.is_success() {
        let message = body["error"].as_str().unwrap_or("request failed");
        return Err(format!("{} ({})", message, status));
    }
    Ok(body)
}
