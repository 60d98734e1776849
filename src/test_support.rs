//! Guideline excerpt shared by unit tests across modules.

pub(crate) const NG12_EXCERPT: &str = "# Suspected cancer: recognition and referral

## 1.1 Lung and pleural cancers

### Lung cancer

1.1.1 Refer people using a suspected cancer pathway referral for lung cancer if they:
* have chest X-ray findings that suggest lung cancer or
* are aged 40 and over and have unexplained haemoptysis. [2015]

1.1.2 Offer an urgent chest X-ray (to be performed within 2 weeks) to assess for lung cancer in people aged 40 and over with 2 or more unexplained symptoms: cough, fatigue, shortness of breath, chest pain, weight loss. [2015]

### Mesothelioma

1.1.5 Consider an urgent chest X-ray in people aged 40 and over with chest pain who have been exposed to asbestos (see recommendation 1.1.2). [2015]

## 1.3 Lower gastrointestinal tract cancers

### Colorectal cancer

1.3.4 Offer testing with quantitative faecal immunochemical testing to assess for colorectal cancer in adults without rectal bleeding who have unexplained abdominal pain or weight loss. [2015, amended 2025]

## 1.5 Gynaecological cancers

### Endometrial cancer

1.5.6 Refer women using a suspected cancer pathway referral for endometrial cancer if they are aged 55 and over with post-menopausal bleeding. [2015]

### Vulval cancer

1.5.14 Consider a suspected cancer pathway referral for vulval cancer in women with an unexplained vulval lump, ulceration or bleeding. [2015]

## 1.10 Haematological cancers in children and young people

1.10.1 Offer a very urgent full blood count (within 48 hours) to assess for leukaemia in children and young people with any of the following:
* pallor
* persistent fatigue
* unexplained fever
* unexplained persistent infections
* generalised lymphadenopathy. [2015]

## 1.13 Non-site-specific symptoms

1.13.1 Consider a non-urgent referral in people with unexplained bleeding. [2015]

## Terms used in this guideline

Persistent means symptoms lasting 3 weeks or more.
";
