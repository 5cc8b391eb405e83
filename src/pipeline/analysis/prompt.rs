use super::types::{CropType, SupportedCrop};

/// Prompt asking the vision model for a single crop name.
pub fn build_crop_prompt() -> String {
    let supported: Vec<&str> = SupportedCrop::ALL.iter().map(|c| c.as_str()).collect();

    format!(
        "Analyze this plant material and identify its specific crop type in one word.\n\
         First check if it's one of these crops: {}.\n\
         If not, identify the specific crop type (like orange, apple, wheat, rice, etc).\n\
         Do not respond with 'other' - always identify the specific crop type.\n\
         Focus on identifying the plant species regardless of what part is shown in the image.\n\
         Respond with just ONE WORD for the crop type.",
        supported.join(", ")
    )
}

/// Prompt asking for the three-field health template.
pub fn build_narration_prompt(crop: &CropType) -> String {
    format!(
        r#"This is a {crop} plant. Carefully analyze this plant image and provide the following information:
1. Health status: You must choose ONLY one of these two values: "healthy" or "diseased"
2. If diseased, what is the specific disease name (use accepted plant pathology terminology)
3. Treatment recommendations: Provide 3-5 specific, practical ways to treat or manage this disease.
   If healthy, provide 2-3 general care tips for maintaining plant health.

Format your response exactly like this:
health_status: [healthy or diseased]
disease_name: [disease name or 'none' if healthy]
treatment: [numbered list of recommendations]

Be very careful to accurately determine if the plant shows actual disease symptoms.
For citrus plants like orange or lemon, be sure to check for citrus canker, greening, black spot, etc."#
    )
}
