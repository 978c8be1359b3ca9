use dialoguer::FuzzySelect;
use dialoguer::theme::ColorfulTheme;

use super::selector::{SelectError, Selector};

/// 内置的终端模糊选择提示。
pub struct PromptSelector {
    theme: ColorfulTheme,
}

impl PromptSelector {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for PromptSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector for PromptSelector {
    fn choose(&self, options: &[String], prompt: &str) -> Result<Option<String>, SelectError> {
        if options.is_empty() {
            return Ok(None);
        }
        let selection = FuzzySelect::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(options)
            .default(0)
            .interact_opt()?;
        Ok(selection.and_then(|idx| options.get(idx).cloned()))
    }
}
