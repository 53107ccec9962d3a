use std::collections::BTreeMap;

use baton_core::config::SkillCommandConfig;

/// A shell command bound to one `skill.function`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillCommand {
    pub command: String,
    /// Overrides the daemon-wide timeout.
    pub timeout_secs: Option<u64>,
}

/// Lookup table from `skill.function` to the command that implements it.
///
/// Commands read their params from `BATON_PARAM_<KEY>` and the install prefix
/// from `PREFIX`. Printing a JSON object on stdout returns structured data.
#[derive(Debug, Clone, Default)]
pub struct SkillCatalog {
    commands: BTreeMap<String, SkillCommand>,
}

fn key(skill: &str, function: &str) -> String {
    format!("{}.{}", skill, function)
}

const BUILTIN: &[(&str, &str, &str)] = &[
    (
        "bootstrap",
        "check",
        r#"missing=0
for d in bin lib etc var share; do [ -d "$PREFIX/$d" ] || missing=$((missing + 1)); done
[ -f "$PREFIX/var/lib/dpkg/status" ] || missing=$((missing + 1))
if [ "$missing" -eq 0 ]; then echo '{"valid": true, "issue_count": 0}'
else printf '{"valid": false, "issue_count": %d}\n' "$missing"; fi"#,
    ),
    (
        "diagnostic",
        "find_issues",
        r#"issues=""
add() { issues="${issues:+$issues,}{\"severity\":\"$1\",\"issue\":\"$2\"}"; }
[ -f "$PREFIX/var/lib/dpkg/status" ] || add critical "dpkg status file missing"
free_kb=$(df -Pk "$PREFIX" 2>/dev/null | awk 'NR==2 {print $4}')
if [ -n "$free_kb" ] && [ "$free_kb" -lt 102400 ]; then add high "Low disk space: $((free_kb / 1024))MB free"; fi
if [ -f "$PREFIX/lib/libtermux_compat.so" ]; then
  case "${LD_PRELOAD:-}" in *libtermux_compat.so*) ;; *) add medium "LD_PRELOAD shim compiled but not loaded" ;; esac
fi
printf '{"issues":[%s]}\n' "$issues""#,
    ),
    (
        "diagnostic",
        "run",
        r#"printf '{"agent":"%s","status":"ok"}\n' "$BATON_AGENT""#,
    ),
    (
        "heal",
        "full_heal",
        r#"n=0
for d in tmp var/run etc/profile.d; do
  [ -d "$PREFIX/$d" ] || { mkdir -p "$PREFIX/$d" && n=$((n + 1)); }
done
if [ "$n" -gt 0 ]; then status=healed; else status=healthy; fi
printf '{"status":"%s","total_repairs":%d}\n' "$status" "$n""#,
    ),
    (
        "security",
        "audit",
        r#"ww=$(find "$PREFIX/bin" -maxdepth 1 -type f -perm -0002 2>/dev/null | wc -l)
printf '{"world_writable":%d}\n' "$ww""#,
    ),
    (
        "fs",
        "exists",
        r#"if [ -e "$BATON_PARAM_PATH" ]; then echo '{"exists": true}'; else echo '{"exists": false}'; fi"#,
    ),
    ("fs", "copy", r#"cp -r -- "$BATON_PARAM_SOURCE" "$BATON_PARAM_DEST""#),
    ("fs", "move", r#"mv -- "$BATON_PARAM_SOURCE" "$BATON_PARAM_DEST""#),
    ("fs", "delete", r#"rm -rf -- "$BATON_PARAM_PATH""#),
    (
        "fs",
        "checksum",
        r#"sum=$(sha256sum -- "$BATON_PARAM_PATH" | cut -d' ' -f1) && printf '{"checksum":"%s"}\n' "$sum""#,
    ),
    (
        "backup",
        "create",
        r#"dir="${BATON_BACKUP_DIR:-$HOME/.baton/backups}"
mkdir -p "$dir" || exit 1
dest="$dir/$(basename -- "$BATON_PARAM_PATH").$(date +%Y%m%d%H%M%S).bak"
cp -a -- "$BATON_PARAM_PATH" "$dest" && printf '{"backup_path":"%s"}\n' "$dest""#,
    ),
    (
        "backup",
        "restore",
        r#"[ -n "${BATON_PARAM_TARGET:-}" ] || { echo "no restore target" >&2; exit 2; }
cp -a -- "$BATON_PARAM_BACKUP_PATH" "$BATON_PARAM_TARGET" && echo '{"restored": true}'"#,
    ),
    (
        "network",
        "check",
        r#"if curl -sS -o /dev/null --max-time 10 --head -- "$BATON_PARAM_URL"; then echo '{"connected": true}'
else echo '{"connected": false}'; fi"#,
    ),
    (
        "network",
        "download",
        r#"dest="${BATON_PARAM_DEST:-${TMPDIR:-/tmp}/$(basename -- "$BATON_PARAM_URL")}"
curl -fsSL -o "$dest" -- "$BATON_PARAM_URL" && printf '{"path":"%s"}\n' "$dest""#,
    ),
    ("network", "fetch", r#"curl -fsSL -- "$BATON_PARAM_URL""#),
    (
        "network",
        "upload",
        r#"curl -fsS -T "$BATON_PARAM_PATH" -- "$BATON_PARAM_URL""#,
    ),
    ("pkg", "install", r#"pkg install -y "$BATON_PARAM_PACKAGE""#),
    ("pkg", "remove", r#"pkg uninstall -y "$BATON_PARAM_PACKAGE""#),
    ("pkg", "update", "pkg update -y"),
    (
        "pkg",
        "verify",
        r#"if dpkg -s "$BATON_PARAM_PACKAGE" >/dev/null 2>&1; then echo '{"installed": true}'
else echo '{"installed": false}'; fi"#,
    ),
];

impl SkillCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every skill function the built-in agents call.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for (skill, function, command) in BUILTIN {
            catalog.insert(skill, function, *command, None);
        }
        catalog
    }

    /// Built-ins with configured commands layered on top.
    pub fn from_config(skills: &[SkillCommandConfig]) -> Self {
        let mut catalog = Self::builtin();
        for s in skills {
            catalog.insert(&s.skill, &s.function, s.command.clone(), s.timeout_secs);
        }
        catalog
    }

    /// Add or replace a command. Returns the one it replaced.
    pub fn insert(
        &mut self,
        skill: &str,
        function: &str,
        command: impl Into<String>,
        timeout_secs: Option<u64>,
    ) -> Option<SkillCommand> {
        self.commands.insert(
            key(skill, function),
            SkillCommand {
                command: command.into(),
                timeout_secs,
            },
        )
    }

    pub fn get(&self, skill: &str, function: &str) -> Option<&SkillCommand> {
        self.commands.get(&key(skill, function))
    }

    /// All `skill.function` keys, sorted.
    pub fn functions(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
