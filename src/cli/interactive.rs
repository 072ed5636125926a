use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};

use anyhow::{Result, anyhow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Selection {
    All,
    None,
    Indices(Vec<usize>),
}

pub(crate) fn prompt_action_selection(action_count: usize) -> Result<Selection> {
    let mut stderr = io::stderr().lock();
    write!(
        stderr,
        "実行するアクションを選択してください（例: 1,3-5 / all / none）[既定: all]: "
    )?;
    stderr.flush()?;

    let mut input = String::new();
    let read = io::stdin().lock().read_line(&mut input)?;
    if read == 0 {
        return Ok(Selection::None);
    }
    parse_selection(&input, action_count)
}

pub(crate) fn parse_selection(input: &str, action_count: usize) -> Result<Selection> {
    if action_count == 0 {
        return Ok(Selection::None);
    }

    let input = input.trim().to_ascii_lowercase();
    if input.is_empty() || input == "all" || input == "*" || input == "すべて" {
        return Ok(Selection::All);
    }
    if matches!(input.as_str(), "none" | "n" | "q" | "quit" | "なし" | "中止") {
        return Ok(Selection::None);
    }

    let mut picked = BTreeSet::new();
    for token in input.split([',', ' ']) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (start, end) = match token.split_once('-') {
            Some((start, end)) => (parse_index(start)?, parse_index(end)?),
            None => {
                let idx = parse_index(token)?;
                (idx, idx)
            }
        };
        if start > end {
            return Err(anyhow!("範囲指定が不正です（start > end）: {token}"));
        }
        if end > action_count {
            return Err(anyhow!("選択が範囲外です（最大 {action_count}）: {token}"));
        }
        for idx in start..=end {
            picked.insert(idx - 1);
        }
    }

    if picked.is_empty() {
        return Err(anyhow!(
            "アクションが選択されていません（'all' または 'none' を使用できます）"
        ));
    }

    Ok(Selection::Indices(picked.into_iter().collect()))
}

fn parse_index(token: &str) -> Result<usize> {
    let idx = token
        .trim()
        .parse::<usize>()
        .map_err(|_| anyhow!("選択が不正です: {token}"))?;
    if idx == 0 {
        return Err(anyhow!("選択は1始まりです（0は指定できません）: {token}"));
    }
    Ok(idx)
}
