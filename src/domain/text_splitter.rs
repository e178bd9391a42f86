//! 文本切分
//!
//! - 混合模式首段切分（按词数，优先在句号/逗号处切开）
//! - 流式合成的分词
//! - 按句切分

/// 首段切分配置
#[derive(Debug, Clone, Copy)]
pub struct HybridSplitConfig {
    /// 首段目标词数
    pub target_words: usize,
    /// 重叠去重词数
    pub overlap_words: usize,
    /// 从目标位置向前搜索切分点的词数
    pub search_window: usize,
}

impl Default for HybridSplitConfig {
    fn default() -> Self {
        Self {
            target_words: 15,
            overlap_words: 3,
            search_window: 10,
        }
    }
}

/// 首段切分结果，second 可能为空
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridSplit {
    pub first: String,
    pub second: String,
}

const HONORIFICS: &[&str] = &[
    "Mr.", "Mrs.", "Ms.", "Dr.", "Prof.", "Rev.", "Hon.", "St.", "Gen.", "Sen.", "Rep.", "Ph.D.",
];

/// 按空白分词
pub fn words(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// U.S.A. / U.K. 这类大写缩写
///
/// 至少两组“大写字母 + 句点”，末尾可再跟一个大写字母（句点可省略，如 U.S.A）。
/// 单个首字母（如 "B."）不算，由 [`is_single_initial`] 结合前后词判断。
fn is_dotted_capitals(word: &str) -> bool {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() < 4 {
        return false;
    }
    let mut i = 0;
    let mut groups = 0;
    while i + 1 < chars.len() && chars[i].is_ascii_uppercase() && chars[i + 1] == '.' {
        groups += 1;
        i += 2;
    }
    if groups < 2 {
        return false;
    }
    match &chars[i..] {
        [] => true,
        [c] => c.is_ascii_uppercase(),
        [c, '.'] => c.is_ascii_uppercase(),
        _ => false,
    }
}

/// e.g. / i.e.
fn is_latin_abbreviation(word: &str) -> bool {
    let chars: Vec<char> = word.chars().collect();
    match chars.as_slice() {
        [a, '.', b] | [a, '.', b, '.'] => a.is_ascii_lowercase() && b.is_ascii_lowercase(),
        _ => false,
    }
}

fn is_single_initial(word: &str) -> bool {
    let chars: Vec<char> = word.chars().collect();
    matches!(chars.as_slice(), [c, '.'] if c.is_ascii_uppercase())
}

fn starts_uppercase(word: &str) -> bool {
    word.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false)
}

/// 以句号结尾但不应切开的缩写
fn is_protected_abbreviation(words: &[&str], i: usize) -> bool {
    let word = words[i];
    if is_dotted_capitals(word) || is_latin_abbreviation(word) || HONORIFICS.contains(&word) {
        return true;
    }
    if is_single_initial(word) {
        // A. Lincoln
        if words.get(i + 1).map(|next| starts_uppercase(next)).unwrap_or(false) {
            return true;
        }
        // Ph. D.
        if i > 0 && words[i - 1].ends_with('.') && starts_uppercase(words[i - 1]) {
            return true;
        }
    }
    false
}

/// 将文本切成首段与剩余部分
///
/// 词数不超过目标时整段作为首段。否则从目标位置向前搜索
/// `search_window` 个词，在非缩写的句号或逗号之后切开；找不到时在目标位置切开。
/// 如果剩余部分以首段末尾的 `overlap_words` 个词开头，则去掉这部分重复。
pub fn split_for_hybrid(text: &str, config: &HybridSplitConfig) -> HybridSplit {
    let words = words(text);
    let target = config.target_words;

    if words.len() <= target {
        return HybridSplit {
            first: text.trim().to_string(),
            second: String::new(),
        };
    }

    let mut split_at = target;
    let search_start = target.saturating_sub(config.search_window);
    for i in (search_start..target).rev() {
        let word = words[i];
        if word.ends_with('.') && !is_protected_abbreviation(&words, i) {
            split_at = i + 1;
            break;
        }
        if word.ends_with(',') {
            split_at = i + 1;
            break;
        }
    }

    let first_words = &words[..split_at];
    let mut second_words = &words[split_at..];

    let overlap = config.overlap_words;
    if overlap > 0
        && first_words.len() >= overlap
        && second_words.len() >= overlap
        && second_words[..overlap] == first_words[first_words.len() - overlap..]
    {
        second_words = &second_words[overlap..];
    }

    tracing::debug!(
        split_at,
        first_words = first_words.len(),
        second_words = second_words.len(),
        "Text split for hybrid synthesis"
    );

    HybridSplit {
        first: first_words.join(" "),
        second: second_words.join(" "),
    }
}

/// 流式合成的输入分词
///
/// 每个词携带其前导空白，拼接后与原文一致
pub fn tokenize_for_streaming(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_word = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            if in_word {
                tokens.push(std::mem::take(&mut current));
                in_word = false;
            }
            current.push(ch);
        } else {
            in_word = true;
            current.push(ch);
        }
    }

    if in_word {
        tokens.push(current);
    }

    tokens
}
