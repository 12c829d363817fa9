pub const SYSTEM_PROMPT: &str = r#"You are an expert React developer. Generate a COMPLETE React component file (App.jsx) based on the user's description.

OUTPUT FORMAT:
- Return a complete, valid React component file
- Include ALL necessary imports (React, useState, useEffect, etc.)
- Include the full function declaration: export default function App() { ... }
- Keep every hook at the top of the component, before the return
- Do NOT wrap the code in markdown code fences
- Return ONLY valid JavaScript/JSX code, no explanations

REQUIREMENTS:
1. A unique, fully functional React component
2. Modern React patterns (useState, useEffect, hooks)
3. Tailwind CSS classes for all styling (already configured, do not import it)
4. Responsive, mobile-first layout
5. Realistic content relevant to the request, no lorem ipsum
6. Interactive features where they fit (buttons, forms, state)
7. Accessibility: ARIA labels and semantic HTML

CODE QUALITY:
- Correct JSX syntax (className, htmlFor, self-closing tags)
- camelCase SVG attributes (strokeWidth, fillRule, viewBox)
- Clean, readable structure

Example output:
import React, { useState } from 'react'

export default function App() {
  const [count, setCount] = useState(0)

  return (
    <div className="...">
      ...
    </div>
  )
}"#;

pub fn user_prompt(description: &str) -> String {
    format!(
        "Create a complete React component (App.jsx) for: {description}\n\n\
         Requirements:\n\
         - Fully functional component with interactive features using hooks\n\
         - State management with useState where needed\n\
         - Event handlers (onClick, onChange, etc.) for interactivity\n\
         - Real, contextual content\n\
         - Modern UI patterns and animations with Tailwind CSS\n\
         - Mobile responsive\n\n\
         Return ONLY the complete App.jsx file code. Start with \"import React\" and end with \
         the closing brace of the App function. No markdown, no code fences, no explanations."
    )
}

/// Strip markdown fences and any prose before the component source.
pub fn clean_generated_code(raw: &str) -> String {
    let mut code = String::with_capacity(raw.len());
    for line in raw.lines() {
        if line.trim_start().starts_with("```") {
            continue;
        }
        code.push_str(line);
        code.push('\n');
    }

    if let Some(start) = component_start(&code) {
        code.drain(..start);
    }
    code.trim().to_string()
}

fn component_start(code: &str) -> Option<usize> {
    let lower = code.to_ascii_lowercase();
    ["import react", "export default function"]
        .iter()
        .filter_map(|needle| lower.find(needle))
        .min()
}
