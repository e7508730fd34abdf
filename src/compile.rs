use std::process::Stdio;

use eyre::{Result, WrapErr, eyre};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::config::CompilerConfig;
use crate::contracts::compiler_mismatches;
use crate::project::{Project, ProjectType};

/// Program and arguments that build the project's artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl BuildCommand {
    /// Foundry takes the compiler settings on the command line; Hardhat reads
    /// them from hardhat.config.js, so they are only checked there.
    pub fn for_project(project: &Project, compiler: &CompilerConfig) -> Self {
        match project.project_type {
            ProjectType::Foundry => {
                let mut args = vec!["build".to_string()];
                if let Some(version) = &compiler.version {
                    args.push("--use".to_string());
                    args.push(version.clone());
                }
                if compiler.optimizer.enabled {
                    args.push("--optimize".to_string());
                    args.push("--optimizer-runs".to_string());
                    args.push(compiler.optimizer.runs.to_string());
                }
                if compiler.via_ir {
                    args.push("--via-ir".to_string());
                }
                Self {
                    program: "forge".to_string(),
                    args,
                }
            }
            ProjectType::Hardhat => Self {
                program: "npx".to_string(),
                args: vec!["hardhat".to_string(), "compile".to_string()],
            },
        }
    }
}

/// Compile the project, streaming toolchain output as it arrives
pub async fn compile(project: &Project, compiler: &CompilerConfig) -> Result<()> {
    if let Some(declared) = project.toolchain_compiler() {
        for mismatch in compiler_mismatches(compiler, &declared) {
            tracing::warn!("foundry.toml disagrees with configured compiler: {}", mismatch);
        }
    }

    let build = BuildCommand::for_project(project, compiler);
    tracing::info!("Running {} {}", build.program, build.args.join(" "));

    let mut child = Command::new(&build.program)
        .args(&build.args)
        .current_dir(&project.root)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .wrap_err_with(|| format!("Failed to spawn {}", build.program))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| eyre!("{} stdout was not captured", build.program))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| eyre!("{} stderr was not captured", build.program))?;

    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();
    let mut stdout_open = true;
    let mut stderr_open = true;

    while stdout_open || stderr_open {
        tokio::select! {
            line = stdout_lines.next_line(), if stdout_open => {
                match line {
                    Ok(Some(l)) => println!("{}", l),
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        tracing::warn!("Error reading stdout: {}", e);
                        stdout_open = false;
                    }
                }
            }
            line = stderr_lines.next_line(), if stderr_open => {
                match line {
                    Ok(Some(l)) => eprintln!("{}", l),
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        tracing::warn!("Error reading stderr: {}", e);
                        stderr_open = false;
                    }
                }
            }
        }
    }

    let status = child
        .wait()
        .await
        .wrap_err_with(|| format!("Failed to wait for {}", build.program))?;

    if !status.success() {
        return Err(eyre!("{} exited with {}", build.program, status));
    }

    Ok(())
}
