//! Feature catalogue: feature id -> per-language markers.
//!
//! A marker is a regular expression; a feature is present in a file when
//! any of its markers for that file's language matches. Specification text
//! is matched against the feature's prose markers instead.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};

use crate::errors::TandemResult;
use crate::models::{FeatureCategory, GapSeverity, Language};

/// Uncompiled feature definition.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureDef {
    pub id: String,
    pub name: String,
    pub category: FeatureCategory,
    pub markers: BTreeMap<Language, Vec<String>>,
    /// Case-insensitive prose patterns for specification text.
    pub spec_markers: Vec<String>,
}

/// A feature with its markers compiled, one alternation per language.
#[derive(Debug)]
pub struct Feature {
    pub id: String,
    pub name: String,
    pub category: FeatureCategory,
    code: BTreeMap<Language, Regex>,
    spec: Option<Regex>,
}

impl Feature {
    pub fn code_pattern(&self, language: Language) -> Option<&Regex> {
        self.code.get(&language)
    }

    pub fn spec_pattern(&self) -> Option<&Regex> {
        self.spec.as_ref()
    }
}

pub fn severity_for(category: FeatureCategory) -> GapSeverity {
    match category {
        FeatureCategory::Validation | FeatureCategory::Core => GapSeverity::High,
        FeatureCategory::Async | FeatureCategory::Configuration => GapSeverity::Medium,
        FeatureCategory::Metadata => GapSeverity::Low,
    }
}

fn alternation(patterns: &[String], case_insensitive: bool) -> TandemResult<Option<Regex>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let joined = patterns
        .iter()
        .map(|p| format!("(?:{p})"))
        .collect::<Vec<_>>()
        .join("|");
    let regex = RegexBuilder::new(&joined)
        .case_insensitive(case_insensitive)
        .multi_line(true)
        .build()?;
    Ok(Some(regex))
}

#[derive(Debug)]
pub struct Catalog {
    features: Vec<Feature>,
}

impl Catalog {
    /// Compile `defs`; an invalid marker is a [`crate::errors::TandemError::Pattern`].
    pub fn new(defs: Vec<FeatureDef>) -> TandemResult<Self> {
        let mut features = Vec::with_capacity(defs.len());
        for def in defs {
            let mut code = BTreeMap::new();
            for (language, patterns) in &def.markers {
                if let Some(regex) = alternation(patterns, false)? {
                    code.insert(*language, regex);
                }
            }
            features.push(Feature {
                spec: alternation(&def.spec_markers, true)?,
                id: def.id,
                name: def.name,
                category: def.category,
                code,
            });
        }
        features.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(Self { features })
    }

    pub fn builtin() -> TandemResult<Self> {
        Self::new(builtin_features())
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn get(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

struct Row {
    id: &'static str,
    name: &'static str,
    category: FeatureCategory,
    /// Go, Python, TypeScript, Java, Rust, C#.
    code: [&'static str; 6],
    spec: &'static str,
}

const LANGUAGE_ORDER: [Language; 6] = [
    Language::Go,
    Language::Python,
    Language::TypeScript,
    Language::Java,
    Language::Rust,
    Language::CSharp,
];

const ROWS: &[Row] = &[
    Row {
        id: "url_validation",
        name: "URL validation",
        category: FeatureCategory::Validation,
        code: [
            r"\b(?:net)?url\.(?:Parse|ParseRequestURI)\(",
            r"\burl(?:parse|split)\(|validators\.url",
            r"new URL\(",
            r"new URL\(|new URI\(|URI\.create\(",
            r"Url::parse\(",
            r"Uri\.TryCreate\(|new Uri\(",
        ],
        spec: r"\bvalid(?:ate|ates|ated|ation)?\b[^.\n]{0,40}\burls?\b|\burls?\b[^.\n]{0,40}\bvalid",
    },
    Row {
        id: "input_length_validation",
        name: "Input length limits",
        category: FeatureCategory::Validation,
        code: [
            r"len\([^)]*\)\s*[<>]=?",
            r"len\([^)]*\)\s*[<>]=?",
            r"\.length\s*[<>]=?",
            r"\.length\(\)\s*[<>]=?",
            r"\.len\(\)\s*[<>]=?",
            r"\.Length\s*[<>]=?",
        ],
        spec: r"\b(?:max(?:imum)?|min(?:imum)?)\s+length\b|\bat most \d+ characters\b",
    },
    Row {
        id: "empty_input_check",
        name: "Empty input rejection",
        category: FeatureCategory::Validation,
        code: [
            r#"==\s*""|strings\.TrimSpace\("#,
            r#"\bif not \w+|==\s*""|\.strip\(\)"#,
            r#"===?\s*(?:""|'')|\.trim\(\)\.length"#,
            r"\.isEmpty\(\)|\.isBlank\(\)",
            r"\.is_empty\(\)|\.trim\(\)\.is_empty",
            r"string\.IsNullOrEmpty|string\.IsNullOrWhiteSpace",
        ],
        spec: r"\bempty\b|\bblank\b|\brequired\b",
    },
    Row {
        id: "pattern_validation",
        name: "Pattern validation",
        category: FeatureCategory::Validation,
        code: [
            r"regexp\.(?:MustCompile|Compile|MatchString)\(",
            r"\bre\.(?:compile|match|fullmatch|search)\(",
            r"new RegExp\(|/\^[^/\n]+\$/",
            r"Pattern\.compile\(|\.matches\(",
            r"Regex::new\(",
            r"new Regex\(|Regex\.IsMatch\(",
        ],
        spec: r"\bpatterns?\b|\bregex|\bregular expressions?\b|\balphanumeric\b",
    },
    Row {
        id: "custom_errors",
        name: "Domain error types",
        category: FeatureCategory::Core,
        code: [
            r"errors\.New\(|fmt\.Errorf\(",
            r"class \w+\(\w*(?:Error|Exception)\)|\braise \w+",
            r"extends Error\b|throw new \w+",
            r"extends \w*Exception\b|throw new \w+",
            r"#\[derive\([^)]*Error|impl (?:std::error::)?Error for|thiserror::",
            r":\s*\w*Exception\b|throw new \w+",
        ],
        spec: r"\berrors?\b|\bexceptions?\b|\bfail(?:s|ure|ures)?\b",
    },
    Row {
        id: "http_api",
        name: "HTTP endpoints",
        category: FeatureCategory::Core,
        code: [
            r"http\.(?:HandleFunc|Handle|ListenAndServe)\(|\bmux\.|gin\.|echo\.New",
            r"@(?:app|router)\.(?:route|get|post|put|delete)\(|APIRouter\(|Flask\(",
            r"\b(?:app|router)\.(?:get|post|put|delete)\(|express\(",
            r"@(?:Get|Post|Put|Delete|Request)Mapping|@RestController",
            r"Router::new\(|#\[(?:get|post|put|delete)\(|actix_web::|axum::",
            r"\[Http(?:Get|Post|Put|Delete)|\.Map(?:Get|Post|Put|Delete)\(|ControllerBase",
        ],
        spec: r"\bhttp\b|\brest\b|\bendpoints?\b|\broutes?\b|\bapi\b",
    },
    Row {
        id: "storage",
        name: "Keyed storage",
        category: FeatureCategory::Core,
        code: [
            r"map\[\w+\]|sql\.(?:Open|DB)\b",
            r"\bdict\[|sqlite3\.|sqlalchemy|=\s*\{\}",
            r"new Map\(|\bMap<|\bRecord<",
            r"\bMap<|HashMap<|Repository\b|JdbcTemplate",
            r"HashMap<|BTreeMap<|rusqlite::|sqlx::",
            r"Dictionary<|DbContext\b",
        ],
        spec: r"\bstor(?:e|es|ed|age)\b|\bpersist|\bdatabase\b|\bsaves?\b",
    },
    Row {
        id: "hashing",
        name: "Content hashing",
        category: FeatureCategory::Core,
        code: [
            r"sha256\.|md5\.|crc32\.|fnv\.",
            r"hashlib\.",
            r"createHash\(",
            r"MessageDigest\.",
            r"Sha256|sha2::|DefaultHasher|crc32fast::",
            r"SHA256\.|MD5\.Create\(",
        ],
        spec: r"\bhash(?:es|ing|ed)?\b|\bsha-?256\b|\bdigest\b",
    },
    Row {
        id: "env_config",
        name: "Environment configuration",
        category: FeatureCategory::Configuration,
        code: [
            r"os\.(?:Getenv|LookupEnv)\(",
            r"os\.environ|os\.getenv\(",
            r"process\.env\b",
            r"System\.getenv\(",
            r"env::var\(",
            r"Environment\.GetEnvironmentVariable\(|IConfiguration\b",
        ],
        spec: r"\benvironment variables?\b|\benv vars?\b",
    },
    Row {
        id: "default_values",
        name: "Configurable defaults",
        category: FeatureCategory::Configuration,
        code: [
            r"\b[Dd]efault\w*\s*=",
            r"\bDEFAULT_\w+\s*=|field\(default",
            r"\bDEFAULT_\w+|\?\?",
            r"\bDEFAULT_\w+",
            r"impl Default for|\bDEFAULT_\w+|\.unwrap_or\(",
            r"\bDefault\w*\s*=|\?\?",
        ],
        spec: r"\bdefaults?\b|\bdefault(?:s)? to\b",
    },
    Row {
        id: "config_file",
        name: "Configuration file loading",
        category: FeatureCategory::Configuration,
        code: [
            r"(?:json|yaml|toml)\.(?:Unmarshal|NewDecoder)\(",
            r"json\.load\(|yaml\.safe_load\(|tomllib\.|configparser",
            r"JSON\.parse\(|readFileSync\(",
            r"\bProperties\b|ObjectMapper\(\)\.readValue",
            r"toml::from_str|serde_json::from_(?:str|reader|slice)",
            r"JsonSerializer\.Deserialize|appsettings",
        ],
        spec: r"\bconfig(?:uration)? files?\b|\.json\b|\.ya?ml\b|\.toml\b",
    },
    Row {
        id: "timeouts",
        name: "Timeouts",
        category: FeatureCategory::Configuration,
        code: [
            r"context\.WithTimeout\(|Timeout:|time\.After\(",
            r"\btimeout\s*=",
            r"setTimeout\(|\btimeout\b",
            r"Duration\.of\w+\(|setTimeout\(|\bTimeout\b",
            r"Duration::from_(?:secs|millis)\(|\btimeout\(",
            r"TimeSpan\.From\w+\(|\bTimeout\b",
        ],
        spec: r"\btime ?outs?\b|\btimed out\b",
    },
    Row {
        id: "timestamps",
        name: "Timestamps",
        category: FeatureCategory::Metadata,
        code: [
            r"time\.Now\(\)",
            r"datetime\.(?:now|utcnow)\(|time\.time\(\)",
            r"new Date\(|Date\.now\(\)",
            r"Instant\.now\(\)|LocalDateTime\.now\(\)|System\.currentTimeMillis\(\)",
            r"SystemTime::now\(\)|Utc::now\(\)|Instant::now\(\)",
            r"DateTime(?:Offset)?\.(?:Now|UtcNow)\b",
        ],
        spec: r"\btimestamps?\b|\bcreated[ _]at\b|\bdates?\b",
    },
    Row {
        id: "unique_ids",
        name: "Unique identifiers",
        category: FeatureCategory::Metadata,
        code: [
            r"uuid\.|rand\.(?:Read|Int|Intn)\(",
            r"uuid\.uuid4\(|secrets\.token_\w+\(",
            r"randomUUID\(|\buuid\b|nanoid\(",
            r"UUID\.randomUUID\(\)|SecureRandom",
            r"Uuid::new_v4\(|rand::",
            r"Guid\.NewGuid\(\)|RandomNumberGenerator",
        ],
        spec: r"\bunique\b|\buuids?\b|\bidentifiers?\b|\bshort codes?\b",
    },
    Row {
        id: "serialization",
        name: "JSON serialization",
        category: FeatureCategory::Metadata,
        code: [
            r#"json:""#,
            r"json\.dumps\(|asdict\(|model_dump",
            r"JSON\.stringify\(",
            r"@Json\w+|ObjectMapper|\bGson\b",
            r"#\[derive\([^)]*Serialize|serde_json::to_",
            r"JsonSerializer\.Serialize|\[JsonPropertyName",
        ],
        spec: r"\bjson\b|\bseriali[sz]",
    },
    Row {
        id: "access_counting",
        name: "Access counters",
        category: FeatureCategory::Metadata,
        code: [
            r"\w\+\+|atomic\.Add\w*\(",
            r"\+=\s*1\b",
            r"\w\+\+|\+=\s*1\b",
            r"\w\+\+|incrementAndGet\(",
            r"\+=\s*1\b|fetch_add\(",
            r"\w\+\+|Interlocked\.Increment\(",
        ],
        spec: r"\bcount(?:s|er|ers|ed)?\b|\bvisits?\b|\bhits?\b|\bclicks?\b",
    },
    Row {
        id: "logging",
        name: "Logging",
        category: FeatureCategory::Metadata,
        code: [
            r"\blog\.(?:Print|Fatal|Panic)\w*\(|\bslog\.|zap\.",
            r"\blogging\.|\blogger\.",
            r"console\.(?:log|error|warn|info)\(|\blogger\.",
            r"\bLogger\b|\blog\.(?:info|warn|error|debug)\(",
            r"\btracing::|\blog::|\b(?:info|warn|error|debug)!\(",
            r"\bILogger\b|_logger\.|Console\.WriteLine\(",
        ],
        spec: r"\blog(?:s|ged|ging)?\b",
    },
    Row {
        id: "async_operations",
        name: "Asynchronous operations",
        category: FeatureCategory::Async,
        code: [
            r"\bgo func\(|\bgo \w+(?:\.\w+)*\(",
            r"\basync def\b|\bawait\b",
            r"\basync\b|\bawait\b",
            r"CompletableFuture|ExecutorService|@Async\b",
            r"\basync fn\b|\.await\b",
            r"\basync Task\b|\bawait\b",
        ],
        spec: r"\basync(?:hronous(?:ly)?)?\b|\bbackground\b|\bnon-blocking\b",
    },
    Row {
        id: "concurrency_safety",
        name: "Concurrency safety",
        category: FeatureCategory::Async,
        code: [
            r"sync\.(?:Mutex|RWMutex)|\.R?Lock\(\)",
            r"threading\.Lock\(|asyncio\.Lock\(",
            r"\bMutex\b|Atomics\.",
            r"\bsynchronized\b|ReentrantLock|Concurrent\w*Map",
            r"\bMutex<|\bRwLock<|\bAtomic\w+",
            r"\block\s*\(|Concurrent\w+<|SemaphoreSlim",
        ],
        spec: r"\bthread[- ]safe\b|\bconcurrent(?:ly)?\b|\bmutex\b|\block(?:s|ing)?\b",
    },
    Row {
        id: "cancellation",
        name: "Cancellation",
        category: FeatureCategory::Async,
        code: [
            r"context\.Context\b|ctx\.Done\(\)",
            r"CancelledError|\.cancel\(\)",
            r"AbortController|AbortSignal",
            r"\.cancel\(|InterruptedException",
            r"CancellationToken|tokio::select!",
            r"CancellationToken",
        ],
        spec: r"\bcancel(?:l?ation|l?ed|s)?\b",
    },
    Row {
        id: "retry",
        name: "Retry with backoff",
        category: FeatureCategory::Async,
        code: [
            r"(?i)\bretr(?:y|ies)\b|\bbackoff\b",
            r"(?i)\bretr(?:y|ies)\b|\bbackoff\b|@retry",
            r"(?i)\bretr(?:y|ies)\b|\bbackoff\b",
            r"(?i)\bretr(?:y|ies)\b|\bbackoff\b|@Retryable",
            r"(?i)\bretr(?:y|ies)\b|\bbackoff\b",
            r"(?i)\bretr(?:y|ies)\b|\bbackoff\b|Polly",
        ],
        spec: r"\bretr(?:y|ies|ied)\b|\bbackoff\b",
    },
    Row {
        id: "expiration",
        name: "Expiration",
        category: FeatureCategory::Core,
        code: [
            r"(?i)expir|\bttl\b",
            r"(?i)expir|\bttl\b",
            r"(?i)expir|\bttl\b",
            r"(?i)expir|\bttl\b",
            r"(?i)expir|\bttl\b",
            r"(?i)expir|\bttl\b",
        ],
        spec: r"\bexpir(?:e|es|ed|y|ation)\b|\bttl\b|\btime[- ]to[- ]live\b",
    },
];

/// The built-in marker table.
pub fn builtin_features() -> Vec<FeatureDef> {
    ROWS.iter()
        .map(|row| FeatureDef {
            id: row.id.to_string(),
            name: row.name.to_string(),
            category: row.category,
            markers: LANGUAGE_ORDER
                .iter()
                .zip(row.code.iter())
                .map(|(language, pattern)| (*language, vec![pattern.to_string()]))
                .collect(),
            spec_markers: vec![row.spec.to_string()],
        })
        .collect()
}
