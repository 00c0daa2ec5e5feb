//! Offline project scaffolding for `unify init`.

use crate::args::InitArgs;
use anyhow::{bail, Context};
use colored::Colorize;
use std::fs;
use std::path::Path;

const CONFIG: &str = r#"[build]
source = "src"
output = "dist"
pretty_urls = true
"#;

const LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>My Site</title>
  <link rel="stylesheet" href="/assets/css/site.css">
</head>
<body>
  <!--#include virtual="/_includes/nav.html" -->
  <main class="unify-content">
    <p>Default content.</p>
  </main>
  <footer>
    <p>Built with unify.</p>
  </footer>
</body>
</html>
"#;

const NAV: &str = r#"<nav>
  <a href="/">Home</a>
  <a href="/about/">About</a>
</nav>
"#;

const INDEX: &str = r#"<title>Home</title>
<main class="unify-content">
  <h1>Hello, unify</h1>
  <p>Edit <code>src/index.html</code> to get started.</p>
</main>
"#;

const ABOUT: &str = r#"---
title: About
description: About this site
---
# About

This page is written in Markdown and folded into `_layout.html`.
"#;

const CSS: &str = r#"body {
  font-family: system-ui, sans-serif;
  margin: 0 auto;
  max-width: 60rem;
  padding: 1rem;
}
nav a {
  margin-right: 1rem;
}
"#;

pub fn run(args: &InitArgs) -> anyhow::Result<()> {
    let root = &args.directory;
    if root.exists() && !args.force {
        let occupied = fs::read_dir(root)
            .with_context(|| format!("reading {}", root.display()))?
            .next()
            .is_some();
        if occupied {
            bail!(
                "{} is not empty; pass --force to scaffold anyway",
                root.display()
            );
        }
    }

    write(root, "unify.toml", CONFIG)?;
    write(root, "src/_layout.html", LAYOUT)?;
    write(root, "src/_includes/nav.html", NAV)?;
    write(root, "src/index.html", INDEX)?;
    write(root, "src/about.md", ABOUT)?;
    write(root, "src/assets/css/site.css", CSS)?;

    println!("{} scaffolded {}", "done:".green().bold(), root.display());
    println!("  next: cd {} && unify serve", root.display());
    Ok(())
}

fn write(root: &Path, rel: &str, content: &str) -> anyhow::Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
