// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! The `completion` command: emit a shell completion script wired to a
//! running mirror. The script asks `kubemirror get` for names, passing the
//! words already on the kubectl command line so namespace and context
//! flags are honored.

use std::io::Write;

use anyhow::Result;

use crate::cli::{Args, Shell};

const BASH_TEMPLATE: &str = r#"
_[[kubectl_alias]]_kubemirror()
{
    local cur prev words
    cur="${COMP_WORDS[COMP_CWORD]}"
    prev="${COMP_WORDS[COMP_CWORD-1]}"
    words="${COMP_WORDS[*]:1:COMP_CWORD-1}"

    case "${prev}" in
        get|describe|edit|delete|logs|exec|port-forward)
            COMPREPLY=( $(compgen -W "pods services deployments configmaps namespaces nodes" -- "${cur}") )
            return 0
            ;;
    esac

    local names
    names=$([[mirror_path]] --address [[mirror_address]] --port [[mirror_port]] get --kubectl-flags="${words}" "${prev}" 2>/dev/null)
    COMPREPLY=( $(compgen -W "${names}" -- "${cur}") )
    return 0
}
complete -F _[[kubectl_alias]]_kubemirror [[kubectl_alias]]
"#;

const ZSH_TEMPLATE: &str = r#"
autoload -U +X bashcompinit && bashcompinit
_[[kubectl_alias]]_kubemirror()
{
    local cur prev words
    cur="${COMP_WORDS[COMP_CWORD]}"
    prev="${COMP_WORDS[COMP_CWORD-1]}"
    words="${COMP_WORDS[*]:1:COMP_CWORD-1}"

    case "${prev}" in
        get|describe|edit|delete|logs|exec|port-forward)
            COMPREPLY=( $(compgen -W "pods services deployments configmaps namespaces nodes" -- "${cur}") )
            return 0
            ;;
    esac

    local names
    names=$([[mirror_path]] --address [[mirror_address]] --port [[mirror_port]] get --kubectl-flags="${words}" "${prev}" 2>/dev/null)
    COMPREPLY=( $(compgen -W "${names}" -- "${cur}") )
    return 0
}
complete -F _[[kubectl_alias]]_kubemirror [[kubectl_alias]]
"#;

pub fn run(args: &Args, shell: Shell, kubectl_alias: &str, mirror_path: &str) -> Result<()> {
    let script = render(args, shell, kubectl_alias, mirror_path);
    let mut stdout = std::io::stdout();
    stdout.write_all(script.as_bytes())?;
    Ok(())
}

fn render(args: &Args, shell: Shell, kubectl_alias: &str, mirror_path: &str) -> String {
    let template = match shell {
        Shell::Bash => BASH_TEMPLATE,
        Shell::Zsh => ZSH_TEMPLATE,
    };
    template
        .replace("[[kubectl_alias]]", kubectl_alias)
        .replace("[[mirror_path]]", mirror_path)
        .replace("[[mirror_address]]", &args.address)
        .replace("[[mirror_port]]", &args.port.to_string())
}
