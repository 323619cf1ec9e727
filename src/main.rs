use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use shader_sandbox::{View, ViewerConfig};

/// Live-preview a multi-pass GLSL fragment shader.
#[derive(Parser, Debug)]
#[command(name = "shader-sandbox", version, about)]
struct Cli {
    /// GLSL 450 fragment shader with pass directives.
    shader: PathBuf,

    #[arg(long, default_value_t = 800)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,

    #[arg(long)]
    title: Option<String>,

    /// Define a preprocessor symbol in every pass (repeatable).
    #[arg(short = 'D', long = "define", value_name = "SYMBOL")]
    defines: Vec<String>,

    /// Show buffer N instead of the main pass.
    #[arg(long, value_name = "N", conflicts_with = "double_buffer")]
    buffer: Option<usize>,

    /// Show the current half of double buffer N instead of the main pass.
    #[arg(long, value_name = "N")]
    double_buffer: Option<usize>,

    /// Do not watch the shader file for changes.
    #[arg(long)]
    no_reload: bool,
}

impl Cli {
    fn view(&self) -> View {
        match (self.buffer, self.double_buffer) {
            (Some(i), _) => View::Buffer(i),
            (None, Some(i)) => View::DoubleBuffer(i),
            (None, None) => View::Main,
        }
    }

    fn into_config(self) -> ViewerConfig {
        let title = self
            .title
            .clone()
            .unwrap_or_else(|| format!("Shader Sandbox - {}", self.shader.display()));
        let view = self.view();
        let mut config = ViewerConfig::new(self.shader)
            .title(title)
            .size(self.width, self.height)
            .hot_reload(!self.no_reload)
            .view(view);
        for symbol in self.defines {
            config = config.define(symbol);
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let shader = cli.shader.display().to_string();
    shader_sandbox::run(cli.into_config()).with_context(|| format!("running {shader}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_view_and_defines() {
        let cli = Cli::parse_from([
            "shader-sandbox",
            "fx.frag",
            "--width",
            "320",
            "-D",
            "PLATFORM_DESKTOP",
            "--double-buffer",
            "1",
        ]);
        let config = cli.into_config();
        assert_eq!(config.width, 320);
        assert_eq!(config.height, 600);
        assert_eq!(config.view, View::DoubleBuffer(1));
        assert_eq!(config.defines, vec!["PLATFORM_DESKTOP".to_string()]);
        assert!(config.hot_reload);
    }

    #[test]
    fn buffer_and_double_buffer_conflict() {
        assert!(
            Cli::try_parse_from(["shader-sandbox", "fx.frag", "--buffer", "0", "--double-buffer", "0"])
                .is_err()
        );
    }
}
