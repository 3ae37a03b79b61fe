//! Deterministic fixers for known pipeline failures.
//!
//! Each fixer is a pure text transformation keyed on exact marker strings. A
//! fixer whose anchor is missing declines instead of guessing, and every fixer
//! is idempotent: running it on its own output reports no change.

use std::sync::LazyLock;

use regex::Regex;

/// When a fixer should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Run on every invocation, logs or not.
    Always,
    /// Run only if the reduced log contains one of these substrings.
    AnySignature(&'static [&'static str]),
}

impl Trigger {
    pub fn matches(self, logs: &str) -> bool {
        match self {
            Trigger::Always => true,
            Trigger::AnySignature(signatures) => signatures.iter().any(|sig| logs.contains(sig)),
        }
    }
}

/// Result of running a fixer over file text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub text: String,
    pub changed: bool,
}

impl Rewrite {
    fn from_pair(original: &str, text: String) -> Self {
        let changed = text != original;
        Self { text, changed }
    }

    fn unchanged(original: &str) -> Self {
        Self {
            text: original.to_string(),
            changed: false,
        }
    }
}

/// A signature-guarded, marker-anchored text transformation.
#[derive(Clone, Copy)]
pub struct Fixer {
    pub name: &'static str,
    pub trigger: Trigger,
    transform: fn(&str) -> Rewrite,
}

impl Fixer {
    pub fn apply(&self, text: &str) -> Rewrite {
        (self.transform)(text)
    }
}

pub const ADDRESS_PREFIX_SIGNATURES: &[&str] = &[
    "The property 'addressPrefixes' cannot be found on this object",
    "addressPrefixes cannot be found",
];

pub const CIDR_SIGNATURES: &[&str] = &[
    "Cannot convert value \"-1\" to type \"System.UInt32\"",
    "Invalid CIDR format",
    "Invalid prefix length in CIDR",
    "Convert-CidrToRange",
];

pub const UINT32_OVERFLOW: Fixer = Fixer {
    name: "uint32-overflow",
    trigger: Trigger::Always,
    transform: fix_uint32_overflow,
};

pub const ADDRESS_PREFIXES: Fixer = Fixer {
    name: "address-prefixes",
    trigger: Trigger::AnySignature(ADDRESS_PREFIX_SIGNATURES),
    transform: fix_address_prefixes,
};

pub const CIDR_VALIDATION: Fixer = Fixer {
    name: "cidr-validation",
    trigger: Trigger::AnySignature(CIDR_SIGNATURES),
    transform: fix_cidr_validation,
};

/// Registry in application order.
pub const FIXERS: &[Fixer] = &[UINT32_OVERFLOW, ADDRESS_PREFIXES, CIDR_VALIDATION];

/// Fixers whose trigger matches the reduced log, in registry order.
pub fn triggered_fixers(logs: &str) -> impl Iterator<Item = &'static Fixer> + '_ {
    FIXERS.iter().filter(move |fixer| fixer.trigger.matches(logs))
}

// In pwsh `0xFFFFFFFF` is an Int32 -1, so the cast throws.
static UINT32_HEX_MAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[uint32\]\s*0xFFFFFFFF").expect("uint32 cast regex should be valid")
});
const UINT32_MAX_VALUE: &str = "[uint32]::MaxValue";

fn fix_uint32_overflow(text: &str) -> Rewrite {
    let replaced = UINT32_HEX_MAX.replace_all(text, UINT32_MAX_VALUE);
    Rewrite::from_pair(text, replaced.into_owned())
}

const SUBNET_HELPER_MARKER: &str = "function Get-SubnetAddressPrefixes";
const SUBNET_HELPER_ANCHOR: &str = "function Test-CidrOverlap {";
const SUBNET_HELPER: &str = r"function Get-SubnetAddressPrefixes {
  param([Parameter(Mandatory)] $SubnetObj)

  $prefixes = @()
  if ($null -eq $SubnetObj) { return @() }

  if ($null -ne $SubnetObj.PSObject.Properties['addressPrefix']) {
    $prefixes += @($SubnetObj.addressPrefix)
  }
  if ($null -ne $SubnetObj.PSObject.Properties['addressPrefixes']) {
    $prefixes += @($SubnetObj.addressPrefixes)
  }

  return @(
    $prefixes |
      Where-Object { -not [string]::IsNullOrWhiteSpace($_) } |
      ForEach-Object { $_.ToString().Trim() }
  )
}

";
const PREFIX_CALL_SITES: &[(&str, &str)] = &[
    (
        "Prefixes = @($_.addressPrefix) + @($_.addressPrefixes)",
        "Prefixes = (Get-SubnetAddressPrefixes -SubnetObj $_)",
    ),
    (
        "$existingPrefixes = @($existing.addressPrefix) + @($existing.addressPrefixes)",
        "$existingPrefixes = Get-SubnetAddressPrefixes -SubnetObj $existing",
    ),
];

/// Route subnet prefix reads through a helper that tolerates missing properties.
fn fix_address_prefixes(text: &str) -> Rewrite {
    let mut out = if text.contains(SUBNET_HELPER_MARKER) {
        text.to_string()
    } else {
        match insert_before_line(text, SUBNET_HELPER_ANCHOR, SUBNET_HELPER) {
            Some(out) => out,
            // Rewriting call sites without the helper would break the script.
            None => return Rewrite::unchanged(text),
        }
    };
    for (from, to) in PREFIX_CALL_SITES {
        out = out.replace(from, to);
    }
    Rewrite::from_pair(text, out)
}

const CIDR_FUNCTION_ANCHOR: &str = "function Convert-CidrToRange {";
const CIDR_FORMAT_MARKER: &str = "Invalid CIDR format";
const CIDR_PREFIX_MARKER: &str = "Invalid prefix length in CIDR";
const CIDR_FORMAT_CHECKS: &str = r#"  if ([string]::IsNullOrWhiteSpace($Cidr)) {
    throw "Invalid CIDR format: <empty>"
  }
  $Cidr = $Cidr.Trim()
  if (-not ($Cidr -match '^\d{1,3}(\.\d{1,3}){3}/\d{1,2}$')) {
    throw "Invalid CIDR format: $Cidr"
  }
"#;
const CIDR_PREFIX_ANCHOR: &str = "$prefix = [int]$parts[1]\n  $ipInt = Convert-IPv4ToUInt32 -Ip $ip\n";
const CIDR_PREFIX_CHECKED: &str = r#"$prefix = [int]$parts[1]
  if ($prefix -lt 0 -or $prefix -gt 32) {
    throw "Invalid prefix length in CIDR: $Cidr"
  }
  try {
    [void][System.Net.IPAddress]::Parse($ip)
  } catch {
    throw "Invalid IP in CIDR: $Cidr"
  }
  $ipInt = Convert-IPv4ToUInt32 -Ip $ip
"#;

/// Add input validation to `Convert-CidrToRange` right after its `param(` line.
fn fix_cidr_validation(text: &str) -> Rewrite {
    if !text.contains(CIDR_FUNCTION_ANCHOR) {
        return Rewrite::unchanged(text);
    }
    if text.contains(CIDR_FORMAT_MARKER) || text.contains(CIDR_PREFIX_MARKER) {
        return Rewrite::unchanged(text);
    }

    let mut out = String::with_capacity(text.len() + CIDR_FORMAT_CHECKS.len());
    let mut in_target = false;
    let mut inserted = false;
    for line in text.split_inclusive('\n') {
        out.push_str(line);
        let trimmed = line.trim();
        if trimmed == CIDR_FUNCTION_ANCHOR {
            in_target = true;
            continue;
        }
        // The param block must belong to the target function.
        if in_target && trimmed.starts_with("function ") {
            in_target = false;
        }
        if in_target && !inserted && trimmed.starts_with("param(") {
            if !line.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(CIDR_FORMAT_CHECKS);
            inserted = true;
        }
    }
    if !inserted {
        return Rewrite::unchanged(text);
    }

    if out.contains(CIDR_PREFIX_ANCHOR) {
        out = out.replacen(CIDR_PREFIX_ANCHOR, CIDR_PREFIX_CHECKED, 1);
    }
    Rewrite::from_pair(text, out)
}

/// Insert `block` before the first line whose trimmed text equals `anchor`.
fn insert_before_line(text: &str, anchor: &str, block: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len() + block.len());
    let mut inserted = false;
    for line in text.split_inclusive('\n') {
        if !inserted && line.trim() == anchor {
            out.push_str(block);
            inserted = true;
        }
        out.push_str(line);
    }
    inserted.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CIDR_SCRIPT: &str = "\
function Convert-IPv4ToUInt32 {
  param([string]$Ip)
  return 0
}

function Convert-CidrToRange {
  param([string]$Cidr)
  $parts = $Cidr.Split('/')
  $ip = $parts[0]
  $prefix = [int]$parts[1]
  $ipInt = Convert-IPv4ToUInt32 -Ip $ip
  $mask = [uint32]0xFFFFFFFF
}
";

    const SUBNET_SCRIPT: &str = "\
function Get-Subnets {
  $subnets | ForEach-Object { [pscustomobject]@{ Name = $_.name; Prefixes = @($_.addressPrefix) + @($_.addressPrefixes) } }
}

function Test-CidrOverlap {
  param($A, $B)
  $existingPrefixes = @($existing.addressPrefix) + @($existing.addressPrefixes)
}
";

    fn assert_idempotent(fixer: &Fixer, input: &str) -> String {
        let first = fixer.apply(input);
        assert!(first.changed, "{} should change the input", fixer.name);
        let second = fixer.apply(&first.text);
        assert!(!second.changed, "{} must be idempotent", fixer.name);
        assert_eq!(second.text, first.text);
        first.text
    }

    #[test]
    fn uint32_overflow_replaces_cast_case_insensitively() {
        let out = assert_idempotent(
            &UINT32_OVERFLOW,
            "$a = [uint32]0xFFFFFFFF\n$b = [UInt32]  0xffffffff\n",
        );
        assert_eq!(out, "$a = [uint32]::MaxValue\n$b = [uint32]::MaxValue\n");
    }

    #[test]
    fn uint32_overflow_without_marker_is_noop() {
        let rewrite = UINT32_OVERFLOW.apply("$a = [uint32]42\n");
        assert!(!rewrite.changed);
        assert_eq!(rewrite.text, "$a = [uint32]42\n");
    }

    #[test]
    fn address_prefixes_inserts_helper_before_anchor_and_rewrites_calls() {
        let out = assert_idempotent(&ADDRESS_PREFIXES, SUBNET_SCRIPT);

        let helper_at = out.find(SUBNET_HELPER_MARKER).expect("helper");
        let anchor_at = out.find(SUBNET_HELPER_ANCHOR).expect("anchor");
        assert!(helper_at < anchor_at);
        assert_eq!(out.matches(SUBNET_HELPER_MARKER).count(), 1);
        assert!(out.contains("Prefixes = (Get-SubnetAddressPrefixes -SubnetObj $_)"));
        assert!(out.contains("$existingPrefixes = Get-SubnetAddressPrefixes -SubnetObj $existing"));
        assert!(!out.contains("@($_.addressPrefix) + @($_.addressPrefixes)"));
    }

    #[test]
    fn address_prefixes_declines_without_anchor() {
        let script = "$x = @{ Prefixes = @($_.addressPrefix) + @($_.addressPrefixes) }\n";
        let rewrite = ADDRESS_PREFIXES.apply(script);
        assert!(!rewrite.changed);
        assert_eq!(rewrite.text, script);
    }

    #[test]
    fn address_prefixes_reuses_existing_helper() {
        let script = format!("{SUBNET_HELPER}{SUBNET_SCRIPT}")
            .replace(SUBNET_HELPER_ANCHOR, "function Other {");
        let out = assert_idempotent(&ADDRESS_PREFIXES, &script);
        assert_eq!(out.matches(SUBNET_HELPER_MARKER).count(), 1);
    }

    #[test]
    fn cidr_validation_inserts_after_param_line() {
        let out = assert_idempotent(&CIDR_VALIDATION, CIDR_SCRIPT);
        let param_at = out.find("  param([string]$Cidr)\n").expect("param");
        let check_at = out.find("throw \"Invalid CIDR format: <empty>\"").expect("check");
        assert!(param_at < check_at);
        assert!(out.contains("throw \"Invalid prefix length in CIDR: $Cidr\""));
        assert!(out.contains("[void][System.Net.IPAddress]::Parse($ip)"));
        // The other function's param line is left alone.
        assert_eq!(out.matches("Invalid CIDR format: <empty>").count(), 1);
    }

    #[test]
    fn cidr_validation_declines_without_function() {
        let rewrite = CIDR_VALIDATION.apply("function Other {\n  param($x)\n}\n");
        assert!(!rewrite.changed);
    }

    #[test]
    fn cidr_validation_declines_when_target_has_no_param_block() {
        let script = "\
function Convert-CidrToRange {
  $parts = $args[0].Split('/')
}

function Get-Other {
  param([string]$Name)
  return $Name
}
";
        let rewrite = CIDR_VALIDATION.apply(script);
        assert!(!rewrite.changed);
        assert_eq!(rewrite.text, script);
    }

    #[test]
    fn cidr_validation_skips_when_already_validated() {
        let script = CIDR_SCRIPT.replace(
            "$parts = ",
            "if (-not $x) { throw \"Invalid CIDR format\" }\n  $parts = ",
        );
        let rewrite = CIDR_VALIDATION.apply(&script);
        assert!(!rewrite.changed);
    }

    #[test]
    fn triggers_follow_log_signatures() {
        let names = |logs: &str| -> Vec<&str> { triggered_fixers(logs).map(|f| f.name).collect() };

        assert_eq!(names(""), vec!["uint32-overflow"]);
        assert_eq!(
            names("ERROR: addressPrefixes cannot be found"),
            vec!["uint32-overflow", "address-prefixes"]
        );
        assert_eq!(
            names("at Convert-CidrToRange, line 12"),
            vec!["uint32-overflow", "cidr-validation"]
        );
        assert_eq!(
            names("Cannot convert value \"-1\" to type \"System.UInt32\""),
            vec!["uint32-overflow", "cidr-validation"]
        );
    }
}
