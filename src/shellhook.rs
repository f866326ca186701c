//! Shell integration. The emitted function wraps the binary, watches
//! stdout for `__SPROUT_CD__=` markers, and cd's the parent shell to the
//! last one while passing everything else through untouched.

use crate::errors::SproutError;
use anyhow::Result;

const POSIX_HOOK: &str = r#"spr() {
  local _out _rc _cd
  _out="$(SPROUT_EMIT_CD_MARKER=1 command sprout "$@")"
  _rc=$?

  _cd="$(printf '%s\n' "$_out" | sed -n 's/^__SPROUT_CD__=//p' | tail -n 1)"

  if [[ -n "$_out" ]]; then
    printf '%s\n' "$_out" | sed '/^__SPROUT_CD__=/d'
  fi

  if [[ -n "$_cd" ]]; then
    cd "$_cd" || return
  fi

  return $_rc
}
"#;

const FISH_HOOK: &str = r#"function spr
  set -l _out (env SPROUT_EMIT_CD_MARKER=1 command sprout $argv)
  set -l _rc $status
  set -l _cd ""

  for line in $_out
    if string match -qr '^__SPROUT_CD__=' -- $line
      set _cd (string replace '__SPROUT_CD__=' '' -- $line)
    else
      echo $line
    end
  end

  if test -n "$_cd"
    cd "$_cd"
  end

  return $_rc
end
"#;

pub fn shell_hook(shell: &str) -> Result<&'static str> {
    match shell {
        "zsh" | "bash" => Ok(POSIX_HOOK),
        "fish" => Ok(FISH_HOOK),
        other => Err(anyhow::Error::new(SproutError::UnsupportedShell {
            shell: other.to_string(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_shells_define_spr() {
        for shell in ["zsh", "bash", "fish"] {
            let hook = shell_hook(shell).unwrap();
            assert!(hook.contains("spr"), "shell {shell}");
            assert!(hook.contains("SPROUT_EMIT_CD_MARKER=1"), "shell {shell}");
            assert!(hook.contains("__SPROUT_CD__="), "shell {shell}");
        }
    }

    #[test]
    fn unknown_shell_is_rejected() {
        let err = shell_hook("powershell").unwrap_err();
        assert!(err.to_string().contains("unsupported shell"));
    }
}
