/// Instruction sent alongside every meal photo.
pub const FOOD_ANALYSIS_PROMPT: &str = "Analyze this food image and provide nutritional information. \
Return the result as a JSON object with foodItems (array of items with name, calories, protein, \
carbs, fat and an optional portion describing the estimated quantity) and totalNutrition (sum of \
all items, with calories, protein, carbs and fat). Use kcal for calories and grams for protein, \
carbs and fat. Respond with the JSON object only.";
