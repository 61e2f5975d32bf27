//! Static vocabulary used by normalization and intent derivation.

/// Compound food names preserved as single tokens so a compound never
/// collides with its substrings during token matching.
pub const COMPOUND_TOKENS: &[&str] = &[
    "sweet potato",
    "hash browns",
    "mixed greens",
    "spring mix",
    "french fries",
    "green beans",
    "bell pepper",
    "cottage cheese",
    "peanut butter",
    "brussels sprouts",
    "brussels sprout",
    "sea cucumber",
    "yellow squash",
];

/// Forms treated as raw for form-intent purposes.
pub const RAW_FORMS: &[&str] = &["raw", "fresh", ""];

/// Forms treated as cooked for form-intent purposes.
pub const COOKED_FORMS: &[&str] = &[
    "cooked",
    "roasted",
    "steamed",
    "fried",
    "grilled",
    "pan_seared",
    "baked",
    "boiled",
    "poached",
    "scrambled",
];

/// Form words recognized inside a name when no explicit form accompanies the
/// query. Order is scan order; the first hit wins.
pub(crate) const NAME_FORM_TOKENS: &[&str] = &[
    "raw",
    "fresh",
    "roasted",
    "steamed",
    "fried",
    "grilled",
    "baked",
    "boiled",
    "poached",
    "scrambled",
    "cooked",
];

/// Known plural → singular mappings; anything not listed passes through.
pub(crate) const PLURAL_MAP: &[(&str, &str)] = &[
    ("grapes", "grape"),
    ("olives", "olive"),
    ("tomatoes", "tomato"),
    ("potatoes", "potato"),
    ("eggs", "egg"),
    ("berries", "berry"),
    ("strawberries", "strawberry"),
    ("blueberries", "blueberry"),
    ("raspberries", "raspberry"),
    ("cherries", "cherry"),
    ("apples", "apple"),
    ("bananas", "banana"),
    ("oranges", "orange"),
    ("peaches", "peach"),
    ("pears", "pear"),
    ("melons", "melon"),
    ("carrots", "carrot"),
    ("mushrooms", "mushroom"),
    ("onions", "onion"),
    ("peppers", "pepper"),
    ("cucumbers", "cucumber"),
    ("zucchinis", "zucchini"),
    ("pumpkins", "pumpkin"),
    ("eggplants", "eggplant"),
    ("avocados", "avocado"),
    ("sprouts", "sprout"),
    ("beans", "bean"),
    ("peas", "pea"),
    ("lentils", "lentil"),
    ("almonds", "almond"),
    ("walnuts", "walnut"),
    ("pecans", "pecan"),
    ("noodles", "noodle"),
    ("croutons", "crouton"),
];

/// Recognized core-class tokens, scanned in token order. Compounds appear in
/// their underscored token spelling and take precedence simply by being the
/// token itself ("sweet_potato" is never reduced to "potato").
pub(crate) const CLASS_TOKENS: &[&str] = &[
    "egg",
    "grape",
    "olive",
    "sweet_potato",
    "potato",
    "tomato",
    "cucumber",
    "sea_cucumber",
    "carrot",
    "mushroom",
    "avocado",
    "celery",
    "spinach",
    "lettuce",
    "broccoli",
    "cauliflower",
    "kale",
    "cabbage",
    "brussels_sprouts",
    "zucchini",
    "yellow_squash",
    "asparagus",
    "pumpkin",
    "corn",
    "eggplant",
    "bell_pepper",
    "pepper",
    "squash",
    "onion",
    "garlic",
    "apple",
    "banana",
    "berry",
    "strawberry",
    "blueberry",
    "raspberry",
    "cherry",
    "melon",
    "watermelon",
    "orange",
    "peach",
    "pear",
    "green_beans",
    "bean",
    "pea",
    "almond",
    "walnut",
    "pecan",
    "chicken",
    "beef",
    "pork",
    "turkey",
    "salmon",
    "tuna",
    "shrimp",
    "rice",
    "pasta",
    "noodle",
    "bread",
    "toast",
    "cheese",
    "yogurt",
    "butter",
    "oil",
    "salad",
    "pizza",
    "burrito",
    "sandwich",
    "soup",
];

/// Name substrings that carry a known low-confidence mapping note.
pub(crate) const LOW_CONFIDENCE_NOTES: &[(&str, &str)] = &[
    (
        "chilaquiles",
        "chilaquiles mapped to the tortilla casserole family; verify portion assumptions",
    ),
    (
        "poke bowl",
        "poke bowl mapped to raw fish over rice; dressing mass unaccounted",
    ),
];
