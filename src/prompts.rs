//! Prompt templates for the extract and translate stages.
//!
//! Templates use Go-template style `{{.Name}}` placeholders so prompts
//! written for the desktop app can be reused as-is. Unknown placeholders
//! are left untouched.

pub const SOURCE_LANGUAGE: &str = "{{.SourceLanguage}}";
pub const TARGET_LANGUAGE: &str = "{{.TargetLanguage}}";
pub const RELAY_INSTRUCTION: &str = "{{.RelayInstruction}}";
pub const VISION_DIRECT_INSTRUCTION: &str = "{{.VisionDirectInstruction}}";
pub const VISION_MODE_INSTRUCTION: &str = "{{.VisionModeInstruction}}";

pub const DEFAULT_EXTRACT_PROMPT: &str = r#"你是一个专业的视觉上下文分析专家，负责为高质量的翻译任务准备完整素材。请完成以下工作：

1. 背景描述：详细说明图像中出现的场景、主体、布局、风格以及任何可能影响理解的视觉线索。
2. 原文提取：逐项提取图像中的全部文字内容，保持{{.SourceLanguage}}原文的顺序与格式（包含换行、缩进、符号和大小写）。

输出要求：
- 将结果严格按照 JSON 结构输出，不要添加任何额外说明：
{
  "background": "...",
  "words": "..."
}
- "words" 字段必须只包含识别到的原文内容。

{{.RelayInstruction}}
{{.VisionDirectInstruction}}"#;

pub const DEFAULT_TRANSLATE_PROMPT: &str = r#"你是一个专业的翻译 AI，专门处理图像文本在特定语境下的翻译任务。你将收到一个 JSON 对象：
- "background" 字段提供场景参考；
- "words" 字段包含需要翻译的原始文本（语种：{{.SourceLanguage}}）。

请将 "words" 字段精准翻译为 {{.TargetLanguage}}，并保持原有的段落、换行与符号。遵循以下原则：
1. 仅翻译 "words" 字段，忽略 "background" 字段内容；
2. 依据 "background" 提供的语境选择合适的术语与表达；
3. 保持专有名词、数字与排版一致；
4. 输出中不得包含额外的说明或注释。

{{.VisionModeInstruction}}"#;

/// Inputs shared by every prompt builder.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromptVariables {
    pub source_language: String,
    pub target_language: String,
    pub use_vision_for_translation: bool,
}

/// Display name for a language code. Unknown codes pass through.
pub fn language_display_name(code: &str) -> &str {
    match code {
        "auto" => "自动检测",
        "zh-CN" => "中文",
        "zh-TW" => "繁体中文",
        "en" => "英文",
        "ja" => "日文",
        "ko" => "韩文",
        "fr" => "法文",
        "de" => "德文",
        "es" => "西班牙文",
        "ru" => "俄文",
        "ar" => "阿拉伯文",
        "pt" => "葡萄牙文",
        "it" => "意大利文",
        "th" => "泰文",
        "vi" => "越南文",
        other => other,
    }
}

pub fn process_extract_prompt(template: &str, vars: &PromptVariables) -> String {
    let prompt = replace_language_placeholders(template, vars)
        .replace(RELAY_INSTRUCTION, &relay_instruction(vars))
        .replace(VISION_DIRECT_INSTRUCTION, &vision_direct_instruction(vars));
    prompt.trim().to_string()
}

pub fn process_translate_prompt(template: &str, vars: &PromptVariables) -> String {
    let prompt = replace_language_placeholders(template, vars)
        .replace(VISION_MODE_INSTRUCTION, &vision_mode_instruction(vars));
    prompt.trim().to_string()
}

/// Single-shot prompt for reading and translating an image in one call.
pub fn build_vision_direct_prompt(vars: &PromptVariables) -> String {
    let target = language_display_name(&vars.target_language);
    let source = if vars.source_language == "auto" {
        "自动检测到的语言"
    } else {
        language_display_name(&vars.source_language)
    };

    format!(
        "你是一个专业的视觉翻译专家，能够直接从图像中识别文字并翻译为{target}。
**核心任务：**
1. 识别图像中的所有文字内容；
2. 将识别的文字从{source}转换为{target}；
3. 直接输出翻译结果，保留原始格式。
**翻译要求：**
- 保持原文的换行、空格、标点符号等格式；
- 确保翻译准确、自然、符合{target}表达习惯；
- 考虑图像上下文，选择最合适的翻译；
- 不要包含任何解释、注释或原始文字。

**输出格式：**
直接输出翻译后的文字，不要添加任何其他内容。"
    )
    .trim()
    .to_string()
}

fn replace_language_placeholders(template: &str, vars: &PromptVariables) -> String {
    template
        .replace(SOURCE_LANGUAGE, language_display_name(&vars.source_language))
        .replace(TARGET_LANGUAGE, language_display_name(&vars.target_language))
}

fn relay_instruction(vars: &PromptVariables) -> String {
    if vars.use_vision_for_translation {
        return String::new();
    }
    format!(
        "当前未启用视觉直出模式，请确保只返回原始文字 JSON，后续翻译流程会将其转换为{}。",
        language_display_name(&vars.target_language)
    )
}

fn vision_direct_instruction(vars: &PromptVariables) -> String {
    if !vars.use_vision_for_translation {
        return String::new();
    }
    format!(
        "已启用视觉直出模式：完成 JSON 输出后，直接给出按原始版式排布的{}翻译结果，不必再返回原文。",
        language_display_name(&vars.target_language)
    )
}

fn vision_mode_instruction(vars: &PromptVariables) -> String {
    let target = language_display_name(&vars.target_language);
    if vars.use_vision_for_translation {
        format!("视觉直出模式开启：若输入仍包含原文，请直接输出对应的{}译文，并保持与原文一致的排版。", target)
    } else {
        format!("输入源自 OCR 流程，请只输出翻译后的{}文本，不要重复或拼接原文。", target)
    }
}
